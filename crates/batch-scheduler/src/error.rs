//! Scheduler error types.

use thiserror::Error;

/// Scheduler error type.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The worker has stopped and accepts no more commands
    #[error("Scheduler stopped")]
    Stopped,

    /// The worker dropped the request without answering
    #[error("Request cancelled")]
    Cancelled,

    /// The worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias using SchedulerError.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
