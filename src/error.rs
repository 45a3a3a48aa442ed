//! Error types for Study Pulse

use thiserror::Error;

/// Errors surfaced by the public API
///
/// Most failures inside the engine are absorbed (logged and replaced by neutral
/// defaults). Only caller-supplied input and configuration produce these.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised by a [`KeyValueStore`](crate::store::KeyValueStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for the public API
pub type Result<T> = std::result::Result<T, InsightError>;
