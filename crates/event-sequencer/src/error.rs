//! Sequencer error types.

use thiserror::Error;

/// Sequencer error type.
#[derive(Error, Debug)]
pub enum SequencerError {
    /// IO error on the counter or lock file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Counter file could not be written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Lock not acquired within the bounded wait
    #[error("Lock not acquired within {0:?}")]
    LockTimeout(std::time::Duration),

    /// Increment must be positive
    #[error("Invalid increment: {0}")]
    InvalidIncrement(i64),
}

/// Result type alias using SequencerError.
pub type SequencerResult<T> = Result<T, SequencerError>;
