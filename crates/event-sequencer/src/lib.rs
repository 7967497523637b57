//! Cross-process sequence ids and the single-sender lock.
//!
//! Every process of a host application shares one counter file. Access is
//! serialized with an advisory lock on a sibling lock file; the wait for
//! that lock is bounded and a timeout degrades to an unlocked increment
//! (logged at warn) instead of stalling the caller.
//!
//! All calls here do blocking file I/O. Async callers run them on the
//! blocking pool.

mod error;
mod file_lock;
mod generator;
mod process_lock;

pub use error::{SequencerError, SequencerResult};
pub use file_lock::{FileLock, LockOutcome};
pub use generator::{SequenceCounters, SequenceGenerator, DEFAULT_LOCK_TIMEOUT, LOCK_POLL_INTERVAL};
pub use process_lock::ProcessLock;
