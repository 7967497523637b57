//! Persisted per-type and global counters.

use crate::{FileLock, LockOutcome, SequencerError, SequencerResult};
use event_model::{SequenceId, TYPE_GLOBAL};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded wait for the counter lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Interval between lock attempts while waiting.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// First value issued for a key that has never been incremented.
const INITIAL_VALUE: i64 = 1;

/// Contents of the counter file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceCounters {
    #[serde(default)]
    pub per_type: BTreeMap<String, i64>,
    #[serde(default)]
    pub global: Option<i64>,
}

impl SequenceCounters {
    /// Next value to be issued for `key` (`TYPE_GLOBAL` for the global counter).
    pub fn next(&self, key: &str) -> i64 {
        let value = if key == TYPE_GLOBAL {
            self.global
        } else {
            self.per_type.get(key).copied()
        };
        value.unwrap_or(INITIAL_VALUE)
    }
}

/// Issues [`SequenceId`]s that are unique across every process sharing the
/// counter file.
pub struct SequenceGenerator {
    counter_file: PathBuf,
    lock_file: PathBuf,
    lock_timeout: Duration,
    poll_interval: Duration,
    /// Serializes callers inside this process.
    local: Mutex<()>,
}

impl SequenceGenerator {
    pub fn new(counter_file: impl Into<PathBuf>, lock_file: impl Into<PathBuf>) -> Self {
        Self {
            counter_file: counter_file.into(),
            lock_file: lock_file.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: LOCK_POLL_INTERVAL,
            local: Mutex::new(()),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll_interval = poll;
        self
    }

    pub fn counter_file(&self) -> &Path {
        &self.counter_file
    }

    /// Reserve `size` consecutive ids for `event_type` and return the first.
    pub fn get_and_add(&self, event_type: &str, size: i64) -> SequencerResult<SequenceId> {
        self.get_and_add_with_outcome(event_type, size)
            .map(|(id, _)| id)
    }

    pub fn get_and_increment(&self, event_type: &str) -> SequencerResult<SequenceId> {
        self.get_and_add(event_type, 1)
    }

    /// Like [`get_and_add`](Self::get_and_add), also reporting whether the
    /// update ran under the cross-process lock.
    pub fn get_and_add_with_outcome(
        &self,
        event_type: &str,
        size: i64,
    ) -> SequencerResult<(SequenceId, LockOutcome)> {
        if size < 1 {
            return Err(SequencerError::InvalidIncrement(size));
        }

        let _local = self.local.lock();

        let (guard, outcome) =
            match FileLock::acquire(&self.lock_file, self.lock_timeout, self.poll_interval) {
                Ok(guard) => (Some(guard), LockOutcome::Acquired),
                Err(SequencerError::LockTimeout(waited)) => {
                    warn!(
                        event_type,
                        waited_ms = waited.as_millis() as u64,
                        "sequence lock not acquired, updating counters unlocked"
                    );
                    (None, LockOutcome::Degraded)
                }
                Err(e) => return Err(e),
            };

        let mut counters = self.read_counters();
        let id = SequenceId {
            global_id: counters.next(TYPE_GLOBAL),
            per_type_id: counters.next(event_type),
        };
        counters.global = Some(id.global_id + size);
        counters
            .per_type
            .insert(event_type.to_string(), id.per_type_id + size);
        self.write_counters(&counters)?;

        drop(guard);

        debug!(
            event_type,
            global_id = id.global_id,
            per_type_id = id.per_type_id,
            "sequence ids issued"
        );
        Ok((id, outcome))
    }

    /// Current counters without taking the lock.
    pub fn snapshot(&self) -> SequenceCounters {
        self.read_counters()
    }

    /// Missing or unreadable counters start over from an empty map.
    fn read_counters(&self) -> SequenceCounters {
        let bytes = match std::fs::read(&self.counter_file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SequenceCounters::default()
            }
            Err(e) => {
                warn!(error = %e, path = %self.counter_file.display(), "counter file unreadable");
                return SequenceCounters::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, path = %self.counter_file.display(), "counter file corrupt");
            SequenceCounters::default()
        })
    }

    /// Write through a temp file and rename so readers never see a torn file.
    fn write_counters(&self, counters: &SequenceCounters) -> SequencerResult<()> {
        if let Some(parent) = self.counter_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.counter_file.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(counters)?)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.counter_file)?;
        Ok(())
    }
}
