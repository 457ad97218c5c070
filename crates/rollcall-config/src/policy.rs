//! Validated policy structures

use crate::schema::{RawConfig, RawServiceConfig};
use std::path::PathBuf;

/// Default absence threshold in hours
pub const DEFAULT_ABSENCE_THRESHOLD_HOURS: u32 = 12;

/// Default database file name
pub const DEFAULT_DATABASE_FILE: &str = "rollcall.db";

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// Service configuration
    pub service: ServiceConfig,

    /// Attendance rules
    pub attendance: AttendancePolicy,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            attendance: AttendancePolicy {
                absence_threshold_hours: raw
                    .policy
                    .absence_threshold_hours
                    .unwrap_or(DEFAULT_ABSENCE_THRESHOLD_HOURS),
            },
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw
                .data_dir
                .unwrap_or_else(rollcall_util::default_data_dir),
            database_file: raw
                .database_file
                .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string()),
        }
    }

    /// Full path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Attendance rules applied by the status aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendancePolicy {
    /// A line becomes Not Allowed once absent hours exceed this
    pub absence_threshold_hours: u32,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            absence_threshold_hours: DEFAULT_ABSENCE_THRESHOLD_HOURS,
        }
    }
}
