//! Scheduler configuration.

use std::time::Duration;

/// When batched events are sent, and how many go into one request.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Timer between batched sends. `None` sends after every stored event.
    pub upload_interval: Option<Duration>,
    /// Stored batched events that trigger a send before the timer fires.
    pub events_bulk_size: usize,
    pub max_events_per_request: usize,
    /// Request size while the host reports low memory.
    pub low_memory_events_per_request: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            upload_interval: Some(Duration::from_secs(15)),
            events_bulk_size: 100,
            max_events_per_request: 50,
            low_memory_events_per_request: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn events_per_request(&self, low_memory: bool) -> usize {
        let limit = if low_memory {
            self.low_memory_events_per_request
        } else {
            self.max_events_per_request
        };
        limit.max(1)
    }
}
