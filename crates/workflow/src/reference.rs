// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template reference grammar and resolution.
//!
//! A reference beginning with `.` names a local template inside the current
//! workflow file. `coll:path` names the file `<workflow_dir>/<coll>/<path>.toml`.
//! A bare name is a collection whose `collection.toml` manifest supplies the
//! entrypoint path.

use meow_core::template::{Template, WorkflowFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from reference parsing and resolution
#[derive(Debug, Error)]
pub enum RefError {
    #[error("empty template reference")]
    Empty,

    #[error("unknown local template '{0}'")]
    UnknownLocal(String),

    #[error("workflow file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("collection '{0}' has no collection.toml manifest")]
    MissingManifest(String),

    #[error("invalid collection manifest {}: {message}", path.display())]
    InvalidManifest { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("workflow parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// A parsed template reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    /// `.name` — template inside the current workflow file
    Local(String),
    /// `coll:path` — file inside a collection
    Collection { collection: String, path: String },
    /// `coll` — collection entrypoint
    Entrypoint(String),
}

/// Collection manifest (`collection.toml`).
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionManifest {
    /// Entry workflow, relative to the collection directory, no extension
    pub entrypoint: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl TemplateRef {
    /// Parse a reference string.
    pub fn parse(reference: &str) -> Result<Self, RefError> {
        let reference = reference.trim();
        if reference.is_empty() || reference == "." {
            return Err(RefError::Empty);
        }
        if let Some(local) = reference.strip_prefix('.') {
            return Ok(TemplateRef::Local(local.to_string()));
        }
        match reference.split_once(':') {
            Some((collection, path)) if !path.is_empty() => Ok(TemplateRef::Collection {
                collection: collection.to_string(),
                path: path.to_string(),
            }),
            Some((collection, _)) => Ok(TemplateRef::Entrypoint(collection.to_string())),
            None => Ok(TemplateRef::Entrypoint(reference.to_string())),
        }
    }

    /// Resolve this reference to a template, in the context of the workflow
    /// file currently executing.
    ///
    /// Local references borrow from `current`; collection references load and
    /// parse the target file and return its `main` template.
    pub fn resolve<'a>(
        &self,
        current: &'a WorkflowFile,
        workflow_dir: &Path,
    ) -> Result<ResolvedTemplate<'a>, RefError> {
        match self {
            TemplateRef::Local(name) => current
                .local(name)
                .map(ResolvedTemplate::Borrowed)
                .ok_or_else(|| RefError::UnknownLocal(name.clone())),
            TemplateRef::Collection { collection, path } => {
                let file_path = workflow_dir.join(collection).join(format!("{}.toml", path));
                load_main(&file_path).map(ResolvedTemplate::Owned)
            }
            TemplateRef::Entrypoint(collection) => {
                let manifest = load_manifest(workflow_dir, collection)?;
                let file_path = workflow_dir
                    .join(collection)
                    .join(format!("{}.toml", manifest.entrypoint));
                load_main(&file_path).map(ResolvedTemplate::Owned)
            }
        }
    }
}

/// A resolved template: borrowed from the current file or loaded from disk.
#[derive(Debug)]
pub enum ResolvedTemplate<'a> {
    Borrowed(&'a Template),
    Owned(Template),
}

impl ResolvedTemplate<'_> {
    pub fn template(&self) -> &Template {
        match self {
            ResolvedTemplate::Borrowed(t) => t,
            ResolvedTemplate::Owned(t) => t,
        }
    }
}

/// Load a collection's manifest.
pub fn load_manifest(workflow_dir: &Path, collection: &str) -> Result<CollectionManifest, RefError> {
    let manifest_path = workflow_dir.join(collection).join("collection.toml");
    if !manifest_path.exists() {
        return Err(RefError::MissingManifest(collection.to_string()));
    }
    let content = std::fs::read_to_string(&manifest_path)?;
    toml::from_str(&content).map_err(|e| RefError::InvalidManifest {
        path: manifest_path,
        message: e.to_string(),
    })
}

fn load_main(path: &Path) -> Result<Template, RefError> {
    if !path.exists() {
        return Err(RefError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let file = crate::parser::parse_workflow(&content).map_err(|e| RefError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    file.main()
        .cloned()
        .ok_or_else(|| RefError::Parse {
            path: path.to_path_buf(),
            message: "no [main] template".to_string(),
        })
}

#[cfg(test)]
#[path = "reference_tests.rs"]
mod tests;
