// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-fatal errors.
//!
//! Step-level failures are data (`StepError` on the step); this enum is for
//! failures that tear down the whole run: the state store refusing writes,
//! a run that cannot be resumed, a workflow that cannot be planned.

use meow_core::RunId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Store(#[from] meow_storage::StoreError),

    #[error("workflow error: {0}")]
    Workflow(String),

    #[error("variable error: {0}")]
    Vars(#[from] meow_workflow::VarError),

    #[error("run {0} is already terminal and cannot be resumed")]
    AlreadyTerminal(RunId),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("engine cancelled")]
    Cancelled,
}
