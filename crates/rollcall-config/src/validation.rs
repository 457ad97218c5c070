//! Configuration validation

use crate::schema::RawConfig;
use std::path::Path;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Absence threshold must be at least 1 hour")]
    ZeroThreshold,

    #[error("Invalid database file name '{value}': {message}")]
    InvalidDatabaseFile { value: String, message: String },

    #[error("Service config error: {0}")]
    ServiceError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.policy.absence_threshold_hours == Some(0) {
        errors.push(ValidationError::ZeroThreshold);
    }

    if let Some(file) = &config.service.database_file
        && let Err(message) = validate_file_name(file)
    {
        errors.push(ValidationError::InvalidDatabaseFile {
            value: file.clone(),
            message,
        });
    }

    if let Some(dir) = &config.service.data_dir
        && dir.as_os_str().is_empty()
    {
        errors.push(ValidationError::ServiceError(
            "data_dir cannot be empty".into(),
        ));
    }

    errors
}

/// A database file must be a bare name, not a path
pub fn validate_file_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("cannot be empty".into());
    }

    let path = Path::new(name);
    if path.components().count() != 1 || path.file_name().is_none() {
        return Err("must be a file name, not a path".into());
    }

    Ok(())
}
