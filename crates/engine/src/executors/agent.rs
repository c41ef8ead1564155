// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-facing executor tasks: spawn, prompt injection, kill.
//!
//! These are thin async wrappers over the session manager that translate
//! its errors into step outcomes. The agent step's suspension (waiting for
//! `agent-output`) is owned by the scheduler's wait-map, not by these tasks.

use super::ExecOutcome;
use indexmap::IndexMap;
use meow_adapters::{AdapterSpec, SessionBackend, SessionManager};
use meow_core::{AgentId, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;

/// Spawn an agent session per its adapter spec.
pub async fn spawn_agent<S: SessionBackend>(
    sessions: Arc<SessionManager<S>>,
    agent_id: AgentId,
    spec: AdapterSpec,
    workdir: PathBuf,
) -> ExecOutcome {
    match sessions.spawn(&agent_id, spec, &workdir, &[]).await {
        Ok(_) => ExecOutcome::Success {
            outputs: IndexMap::new(),
        },
        Err(e) => ExecOutcome::Error {
            kind: ErrorKind::Internal,
            message: format!("failed to spawn agent '{}': {}", agent_id, e),
        },
    }
}

/// Inject a (bound) prompt into an active agent.
///
/// On success the step is suspended: the scheduler already registered the
/// `agent-output` waiter before this task ran, so an instant reply cannot
/// be lost.
pub async fn inject_prompt<S: SessionBackend>(
    sessions: Arc<SessionManager<S>>,
    agent_id: AgentId,
    prompt: String,
) -> ExecOutcome {
    match sessions.inject(&agent_id, &prompt).await {
        Ok(()) => ExecOutcome::Suspended,
        Err(e) => ExecOutcome::Error {
            kind: ErrorKind::Dispatch,
            message: format!("failed to inject prompt into '{}': {}", agent_id, e),
        },
    }
}

/// Stop an agent session (kill step, or the agent-timeout protocol).
pub async fn stop_agent<S: SessionBackend>(
    sessions: Arc<SessionManager<S>>,
    agent_id: AgentId,
    graceful: bool,
) -> ExecOutcome {
    match sessions.stop(&agent_id, graceful).await {
        Ok(()) => ExecOutcome::Success {
            outputs: IndexMap::new(),
        },
        Err(e) => ExecOutcome::Error {
            kind: ErrorKind::Internal,
            message: format!("failed to stop agent '{}': {}", agent_id, e),
        },
    }
}
