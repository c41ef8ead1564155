// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run advisory lock.
//!
//! One engine per run per machine: `meow resume` on a run whose engine is
//! still alive must fail fast instead of corrupting the document. The lock
//! is held for the engine's lifetime and released on drop (or process exit).

use crate::run_store::{RunStore, StoreError};
use fs2::FileExt;
use meow_core::RunId;
use std::fs::{self, OpenOptions};
use std::fs::File;

/// Held exclusive lock on a run.
///
/// Dropping the guard releases the lock.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    run_id: RunId,
}

impl RunLock {
    /// Acquire the exclusive lock for a run, failing fast if another engine
    /// holds it.
    pub fn acquire(store: &RunStore, run_id: &RunId) -> Result<Self, StoreError> {
        fs::create_dir_all(store.runs_dir())?;
        let path = store.lock_path(run_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(run_id.clone()))?;

        Ok(Self {
            file,
            run_id: run_id.clone(),
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(run = %self.run_id, error = %e, "failed to release run lock");
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
