// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow file discovery for `meow ls` and `meow run`.

use crate::reference::{load_manifest, RefError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from workflow discovery
#[derive(Debug, Error)]
pub enum FindError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ref(#[from] RefError),
}

/// One runnable entry for `meow ls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowListing {
    /// Workflow file stem or collection directory name
    pub workflow: String,
    #[serde(rename = "isCollection")]
    pub is_collection: bool,
    /// Entrypoint path for collections, `None` for plain files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
}

/// Enumerate runnable workflows: `*.toml` files at the top of the workflow
/// directory plus subdirectories carrying a `collection.toml` manifest.
///
/// Broken entries are skipped with a warning so one bad collection cannot
/// hide the rest of the listing.
pub fn list_workflows(workflow_dir: &Path) -> Result<Vec<WorkflowListing>, FindError> {
    let mut listings = Vec::new();
    if !workflow_dir.exists() {
        return Ok(listings);
    }

    for entry in std::fs::read_dir(workflow_dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let Some(name) = dir_name(&path) else {
                continue;
            };
            match load_manifest(workflow_dir, &name) {
                Ok(manifest) => listings.push(WorkflowListing {
                    workflow: name,
                    is_collection: true,
                    entrypoint: Some(manifest.entrypoint),
                }),
                Err(RefError::MissingManifest(_)) => continue,
                Err(e) => {
                    tracing::warn!(dir = %path.display(), error = %e, "skipping invalid collection");
                }
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                listings.push(WorkflowListing {
                    workflow: stem.to_string(),
                    is_collection: false,
                    entrypoint: None,
                });
            }
        }
    }

    listings.sort_by(|a, b| a.workflow.cmp(&b.workflow));
    Ok(listings)
}

/// Resolve a `meow run` target to a workflow file path.
///
/// Accepts a filesystem path (with `.toml` extension or existing file), a
/// collection-qualified reference `coll:path`, or a bare collection name.
pub fn resolve_run_target(workflow_dir: &Path, target: &str) -> Result<PathBuf, FindError> {
    // Direct file path first: `meow run ./deploy.toml`
    let as_path = PathBuf::from(target);
    if as_path.is_file() {
        return Ok(as_path);
    }

    if let Some((collection, path)) = target.split_once(':') {
        let file = workflow_dir.join(collection).join(format!("{}.toml", path));
        if file.is_file() {
            return Ok(file);
        }
        return Err(FindError::NotFound(target.to_string()));
    }

    // Bare name: workflow file stem, then collection entrypoint
    let file = workflow_dir.join(format!("{}.toml", target));
    if file.is_file() {
        return Ok(file);
    }
    let manifest = load_manifest(workflow_dir, target)
        .map_err(|_| FindError::NotFound(target.to_string()))?;
    let file = workflow_dir
        .join(target)
        .join(format!("{}.toml", manifest.entrypoint));
    if file.is_file() {
        return Ok(file);
    }
    Err(FindError::NotFound(target.to_string()))
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
}

#[cfg(test)]
#[path = "find_tests.rs"]
mod tests;
