//! Process-wide lock file preventing overlapping sync runs.
//!
//! Acquire-or-skip semantics: when the lock file already exists the new
//! run exits with a benign skip instead of waiting. The guard removes the
//! file on drop, so release happens on every exit path. There is a race
//! window between the existence check and the create - acceptable for a
//! single-operator scheduled job.

use crate::error::{Result, SyncError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default lock file name, created in the working directory.
pub const DEFAULT_LOCK_FILE: &str = ".vitals_sync.lock";

/// RAII guard marking a sync in progress.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
}

impl LockHandle {
    /// Try to acquire the lock.
    ///
    /// Returns `Ok(None)` when another run appears to hold it already.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();

        if path.exists() {
            warn!(lock = %path.display(), "Lock file exists, another sync may be running");
            return Ok(None);
        }

        fs::write(&path, std::process::id().to_string()).map_err(|e| SyncError::Lock {
            path: path.clone(),
            source: e,
        })?;

        Ok(Some(Self { path }))
    }

    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}
