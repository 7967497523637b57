//! Per-policy send state shared between the worker and its handle.

use event_model::SendPolicy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where a policy class is in its send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Nothing stored since the last successful send.
    Idle,
    /// Rows stored and waiting for a trigger.
    Accumulating,
    /// A send pass is draining this policy.
    Sending,
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyState::Idle => "idle",
            PolicyState::Accumulating => "accumulating",
            PolicyState::Sending => "sending",
        };
        f.write_str(s)
    }
}

/// Outcome of one send pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Requests acknowledged by the collector.
    pub batches: usize,
    /// Rows deleted after acknowledgement.
    pub rows: usize,
    /// Whether the pass stopped on a failure.
    pub failed: bool,
}

impl FlushReport {
    pub(crate) fn merge(&mut self, other: FlushReport) {
        self.batches += other.batches;
        self.rows += other.rows;
        self.failed |= other.failed;
    }
}

#[derive(Debug)]
pub(crate) struct SharedState {
    policies: Mutex<HashMap<SendPolicy, PolicyState>>,
    low_memory: AtomicBool,
}

impl Default for SharedState {
    fn default() -> Self {
        let policies = SendPolicy::ALL
            .iter()
            .map(|policy| (*policy, PolicyState::Idle))
            .collect();
        Self {
            policies: Mutex::new(policies),
            low_memory: AtomicBool::new(false),
        }
    }
}

impl SharedState {
    pub fn policy(&self, policy: SendPolicy) -> PolicyState {
        self.policies
            .lock()
            .get(&policy)
            .copied()
            .unwrap_or(PolicyState::Idle)
    }

    pub fn set_policy(&self, policy: SendPolicy, state: PolicyState) {
        self.policies.lock().insert(policy, state);
    }

    pub fn low_memory(&self) -> bool {
        self.low_memory.load(Ordering::Relaxed)
    }

    pub fn set_low_memory(&self, low: bool) {
        self.low_memory.store(low, Ordering::Relaxed);
    }
}
