// SPDX-License-Identifier: MIT

//! Exclusive PID lock so two `supervisor run` invocations never share one
//! state directory by accident (a second instance of this specific process
//! is a footgun, not the multi-executor fleet the design calls for — two
//! independent state directories are the supported way to run more than
//! one).

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another supervisor process already holds the lock at {0}")]
    AlreadyLocked(PathBuf),
    #[error("failed to access lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An acquired PID lock. Released (and the file's advisory lock dropped)
/// when this value is dropped.
pub struct PidLock {
    _file: File,
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(state_dir: &Path) -> Result<Self, LockError> {
        let path = state_dir.join("supervisor.pid");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::Io { path: path.clone(), source: e })?;

        file.try_lock_exclusive()
            .map_err(|_| LockError::AlreadyLocked(path.clone()))?;

        let mut file = file;
        file.set_len(0).map_err(|e| LockError::Io { path: path.clone(), source: e })?;
        writeln!(file, "{}", std::process::id()).map_err(|e| LockError::Io { path: path.clone(), source: e })?;

        Ok(Self { _file: file, path })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
