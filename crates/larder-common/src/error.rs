//! Error types shared across Larder crates

use thiserror::Error;

/// Result type alias for Larder operations
pub type Result<T> = std::result::Result<T, LarderError>;

/// Main error type for Larder
#[derive(Error, Debug)]
pub enum LarderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidSetting { key: String, value: String },
}

impl LarderError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an error for an environment setting that failed to parse
    pub fn invalid_setting(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            value: value.into(),
        }
    }
}
