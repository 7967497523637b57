//! Lock electing the one process allowed to deliver events.

use crate::{FileLock, SequencerResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
enum Holder {
    File {
        path: PathBuf,
        held: Option<FileLock>,
    },
    InProcess,
}

/// Non-blocking, process-lifetime lock on the sender lock file.
///
/// Only the holder sends; other processes keep inserting into the shared
/// store and leave delivery to the holder. The lock is never released
/// voluntarily while the pipeline runs.
#[derive(Debug)]
pub struct ProcessLock {
    holder: Holder,
}

impl ProcessLock {
    /// Try once to become the sending process.
    pub fn acquire(path: &Path) -> SequencerResult<Self> {
        let held = FileLock::try_acquire(path)?;
        if held.is_some() {
            info!(path = %path.display(), "sender lock acquired");
        } else {
            debug!(path = %path.display(), "sender lock held by another process");
        }
        Ok(Self {
            holder: Holder::File {
                path: path.to_path_buf(),
                held,
            },
        })
    }

    /// A lock that is always held, for single-process embedding and tests.
    pub fn in_process() -> Self {
        Self {
            holder: Holder::InProcess,
        }
    }

    pub fn is_acquired(&self) -> bool {
        match &self.holder {
            Holder::File { held, .. } => held.is_some(),
            Holder::InProcess => true,
        }
    }

    /// Retry acquisition if another process held the lock earlier.
    pub fn retry(&mut self) -> SequencerResult<bool> {
        if let Holder::File { path, held: held @ None } = &mut self.holder {
            *held = FileLock::try_acquire(path)?;
            if held.is_some() {
                info!(path = %path.display(), "sender lock acquired");
            }
        }
        Ok(self.is_acquired())
    }
}
