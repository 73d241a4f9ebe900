//! Configuration error type shared by every Signet config loader

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The layered sources could not be merged or extracted
    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    /// A value parsed fine but is not usable
    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// The requested configuration file does not exist
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigurationError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
