//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Attendance policy
    #[serde(default)]
    pub policy: RawAttendancePolicy,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Database file name inside the data directory
    pub database_file: Option<String>,
}

/// Attendance policy settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAttendancePolicy {
    /// Absent hours a line may accumulate before it becomes Not Allowed
    pub absence_threshold_hours: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            data_dir = "/srv/rollcall"
            database_file = "term.db"

            [policy]
            absence_threshold_hours = 9
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.data_dir, Some(PathBuf::from("/srv/rollcall")));
        assert_eq!(config.service.database_file.as_deref(), Some("term.db"));
        assert_eq!(config.policy.absence_threshold_hours, Some(9));
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.service.data_dir.is_none());
        assert!(config.policy.absence_threshold_hours.is_none());
    }
}
