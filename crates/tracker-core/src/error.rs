//! Tracker error types.

use thiserror::Error;

/// Errors raised while starting or stopping the tracker.
///
/// Producers calling [`crate::Tracker::track`] never see these; once the
/// pipeline runs, faults are logged and turned into failed results.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] tracker_config_and_utils::CoreError),

    #[error("Storage error: {0}")]
    Database(#[from] event_database::DatabaseError),

    #[error("Transport error: {0}")]
    Sender(#[from] event_sender::SenderError),

    #[error("Sequencer error: {0}")]
    Sequencer(#[from] event_sequencer::SequencerError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] batch_scheduler::SchedulerError),

    #[error("Tracker is shut down")]
    ShutDown,
}

pub type TrackerResult<T> = Result<T, TrackerError>;
