//! Error types for checkpoint storage backends.

use thiserror::Error;

/// Errors raised by checkpoint savers.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The referenced checkpoint does not exist.
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Checkpoint (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The caller passed an unusable configuration (e.g. missing thread id).
    #[error("Invalid checkpoint config: {0}")]
    InvalidConfig(String),
}

impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Storage(err.to_string())
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
