// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! meow-engine: the workflow orchestrator engine
//!
//! The scheduler owns one Run document and drives it to a terminal status:
//! it computes the ready set from the dependency DAG, dispatches steps to
//! per-kind executors running as parallel tasks, routes events between
//! suspended agent steps and the outside world, validates agent outputs with
//! retry-by-re-prompting, and persists every transition before acting on it.

pub mod binder;
pub mod error;
pub mod executors;
pub mod ipc;
pub mod recovery;
pub mod router;
pub mod scheduler;
pub mod validator;

pub use binder::{bind_expr, bind_string, BindError, Env};
pub use error::EngineError;
pub use ipc::{IpcClient, IpcListener, Request, Response};
pub use router::{EventRouter, Outcome, Predicate};
pub use scheduler::{Engine, EngineDeps};
pub use validator::{validate_outputs, ValidationFailure};
