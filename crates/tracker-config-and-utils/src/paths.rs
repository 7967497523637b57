//! File system paths for the tracker.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Deprecated event database left behind by older releases.
const LEGACY_DATABASE_NAME: &str = "growing3.db";

/// Manages file system paths for the tracker.
///
/// Every process of one host application shares one base directory; the
/// database, sequence counter and locks under it are the only state the
/// processes have in common.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.tracker)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.tracker`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".tracker"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.tracker).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.tracker/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the event database path (~/.tracker/events.db).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("events.db")
    }

    /// Get the legacy event database path (~/.tracker/growing3.db).
    pub fn legacy_database_file(&self) -> PathBuf {
        self.base_dir.join(LEGACY_DATABASE_NAME)
    }

    /// Get the persisted sequence counter path (~/.tracker/event_sequence.json).
    pub fn sequence_file(&self) -> PathBuf {
        self.base_dir.join("event_sequence.json")
    }

    /// Get the lock file guarding the sequence counter.
    pub fn sequence_lock_file(&self) -> PathBuf {
        self.base_dir.join("event_sequence.lock")
    }

    /// Get the lock file electing the single sending process.
    pub fn sender_lock_file(&self) -> PathBuf {
        self.base_dir.join("sender.lock")
    }

    /// Get the IPC socket path (~/.tracker/events.sock).
    pub fn socket_file(&self) -> PathBuf {
        self.base_dir.join("events.sock")
    }

    /// Get the logs directory (~/.tracker/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.tracker/logs/tracker.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("tracker.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
