//! Error types for the subscription registry and dispatcher.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for registry and dispatch operations.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid subscription record: {0}")]
    InvalidRecord(String),

    #[error("Corrupt subscription record {}: {reason}", .path.display())]
    Integrity { path: PathBuf, reason: String },

    #[error("Subscription store is locked by another process")]
    Locked,

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("The operation was interrupted")]
    Interrupted,
}

impl NotifyError {
    /// Build an integrity error for the record file at `path`.
    pub fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        NotifyError::Integrity {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for NotifyError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            NotifyError::Deserialization(e.to_string())
        } else {
            NotifyError::Serialization(e.to_string())
        }
    }
}

impl From<base64::DecodeError> for NotifyError {
    fn from(e: base64::DecodeError) -> Self {
        NotifyError::Config(format!("invalid base64url key: {e}"))
    }
}

/// Result type for registry and dispatch operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
