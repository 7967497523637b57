//! Sender error types.

use thiserror::Error;

/// Sender error type.
#[derive(Error, Debug)]
pub enum SenderError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the collector
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Redirects are not followed
    #[error("Redirect not followed: {0}")]
    Redirect(u16),

    /// Body encoding error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SenderError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SenderError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            SenderError::Status(status) => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using SenderError.
pub type SenderResult<T> = Result<T, SenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SenderError::Status(503).is_transient());
        assert!(SenderError::Status(500).is_transient());
        assert!(!SenderError::Status(404).is_transient());
        assert!(!SenderError::Redirect(302).is_transient());
    }
}
