//! Error types for Cardinal Core

use thiserror::Error;

/// Result type alias using Cardinal's core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(#[from] crate::limits::ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
