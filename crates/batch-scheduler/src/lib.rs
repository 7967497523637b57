//! Batch scheduling of event delivery.
//!
//! One Tokio task owns the event store and the sender. Everything else
//! talks to it through [`BatchScheduler`], which only enqueues. Per send
//! policy the worker tracks a small state machine:
//!
//! ```text
//! Idle --stored--> Accumulating --trigger--> Sending --ack--> Idle
//!                       ^                       |
//!                       +-------failure---------+
//! ```
//!
//! Triggers are the bulk size, the upload timer and the host going to the
//! background. Instant events trigger a send of the instant policy as soon
//! as they are stored.

mod config;
mod error;
mod scheduler;
mod state;
mod worker;

#[cfg(test)]
mod tests;

pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{BatchScheduler, SchedulerBuilder};
pub use state::{FlushReport, PolicyState};

pub(crate) use state::SharedState;
