//! Marshaller error types.

use thiserror::Error;

/// Error raised for a single record or envelope.
#[derive(Error, Debug)]
pub enum MarshallError {
    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary layout error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Decoded event failed validation
    #[error(transparent)]
    Invalid(#[from] event_model::ModelError),
}

/// Result type alias using MarshallError.
pub type MarshallResult<T> = Result<T, MarshallError>;
