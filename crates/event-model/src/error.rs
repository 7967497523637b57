use thiserror::Error;

/// Errors raised while validating or converting model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Event is missing a required field
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Unknown send policy code or name
    #[error("Unknown send policy: {0}")]
    UnknownSendPolicy(String),

    /// Unknown storage category
    #[error("Unknown event category: {0}")]
    UnknownCategory(String),
}

/// Result type alias using ModelError.
pub type ModelResult<T> = Result<T, ModelError>;
