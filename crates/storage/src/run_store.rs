// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whole-file Run persistence.
//!
//! Write discipline: serialize in memory, write to a sibling temp file,
//! fsync, atomically rename over the target. Reads are whole-file. A crash
//! at any point leaves either the old document or the new one, never a
//! truncated hybrid.

use meow_core::{Run, RunId};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from run persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("run {0} is locked by another process")]
    Locked(RunId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Store for run documents under one runs directory.
#[derive(Debug, Clone)]
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Document path for a run.
    pub fn run_path(&self, run_id: &RunId) -> PathBuf {
        self.runs_dir.join(format!("{}.json", run_id))
    }

    /// IPC socket path for a run's engine.
    pub fn socket_path(&self, run_id: &RunId) -> PathBuf {
        self.runs_dir.join(format!("{}.sock", run_id))
    }

    /// Lock file path for a run.
    pub fn lock_path(&self, run_id: &RunId) -> PathBuf {
        self.runs_dir.join(format!("{}.lock", run_id))
    }

    /// Persist a run atomically (write to .tmp, fsync, rename).
    pub fn save(&self, run: &Run) -> Result<(), StoreError> {
        fs::create_dir_all(&self.runs_dir)?;

        let path = self.run_path(&run.id);
        let tmp_path = path.with_extension("json.tmp");

        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, run)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Load a run document.
    pub fn load(&self, run_id: &RunId) -> Result<Run, StoreError> {
        let path = self.run_path(run_id);
        if !path.exists() {
            return Err(StoreError::NotFound(run_id.clone()));
        }
        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// List persisted run ids, oldest first (run ids sort by creation time).
    pub fn list(&self) -> Result<Vec<RunId>, StoreError> {
        let mut ids = Vec::new();
        if !self.runs_dir.exists() {
            return Ok(ids);
        }
        for entry in fs::read_dir(&self.runs_dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(RunId::new(stem));
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    /// Remove a run's socket file if a previous engine left one behind.
    pub fn remove_stale_socket(&self, run_id: &RunId) -> Result<(), StoreError> {
        let path = self.socket_path(run_id);
        if path.exists() {
            tracing::warn!(path = %path.display(), "removing stale socket");
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "run_store_tests.rs"]
mod tests;
