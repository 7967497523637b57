//! Tracker context.
//!
//! [`Tracker`] assembles the pipeline from its parts: the component
//! registry with the default stages, the event store, the cross-process
//! sequencer, the sender lock and the batch scheduler. Producers hold a
//! reference to the tracker and call [`Tracker::track`].

mod components;
mod error;
mod lifecycle;
mod tracker;

#[cfg(test)]
mod tests;

pub use components::{install_default_components, transport_config};
pub use error::{TrackerError, TrackerResult};
pub use lifecycle::{AppLifecycle, LifecycleListener, Subscription};
pub use tracker::{scheduler_config, Tracker};
