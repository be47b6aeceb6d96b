//! Error types for marketpipe-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Timestamp out of representable range: {0}")]
    TimestampOutOfRange(i64),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
