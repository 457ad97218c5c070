//! Configuration parsing and validation for rollcall
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service paths (data directory, database file)
//! - Attendance policy (absence threshold)
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading config");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let policy = parse_config("config_version = 1").unwrap();
        assert_eq!(policy.attendance.absence_threshold_hours, 12);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_policy() {
        let config = r#"
            config_version = 1

            [policy]
            absence_threshold_hours = 0
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1").unwrap();
        writeln!(file, "[policy]").unwrap();
        writeln!(file, "absence_threshold_hours = 15").unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.attendance.absence_threshold_hours, 15);
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = load_config("/nonexistent/rollcall/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
