// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: applies adapter specs through a session backend.
//!
//! Session names are `meow-<run_id>-<agent_id>` and are the sole identity —
//! the name is recomputable from the run, so a restarted engine can find its
//! agents without any persisted backend state.

use crate::session::{SessionBackend, SessionError};
use crate::spec::{AdapterSpec, InjectionMethod};
use meow_core::{AgentId, RunId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from session manager operations
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("agent not registered: {0}")]
    NotRegistered(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

struct ManagedAgent {
    spec: AdapterSpec,
    session_name: String,
}

/// Creates, drives and kills one run's agent sessions.
pub struct SessionManager<S: SessionBackend> {
    backend: S,
    run_id: RunId,
    /// Env injected into every agent session (`MEOW_RUN_ID`, `MEOW_SOCKET`, …)
    base_env: Vec<(String, String)>,
    poll_interval: Duration,
    agents: Arc<Mutex<HashMap<AgentId, ManagedAgent>>>,
}

impl<S: SessionBackend> SessionManager<S> {
    pub fn new(
        backend: S,
        run_id: RunId,
        base_env: Vec<(String, String)>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            run_id,
            base_env,
            poll_interval,
            agents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Session name for an agent of this run.
    pub fn session_name(&self, agent_id: &AgentId) -> String {
        format!("meow-{}-{}", self.run_id, agent_id)
    }

    fn prefix(&self) -> String {
        format!("meow-{}-", self.run_id)
    }

    fn require(&self, agent_id: &AgentId) -> Result<(AdapterSpec, String), ManagerError> {
        self.agents
            .lock()
            .get(agent_id)
            .map(|a| (a.spec.clone(), a.session_name.clone()))
            .ok_or_else(|| ManagerError::NotRegistered(agent_id.to_string()))
    }

    /// Spawn a session for `agent_id` per the adapter spec and wait out the
    /// startup delay.
    pub async fn spawn(
        &self,
        agent_id: &AgentId,
        spec: AdapterSpec,
        workdir: &Path,
        extra_env: &[(String, String)],
    ) -> Result<String, ManagerError> {
        let session_name = self.session_name(agent_id);

        let mut env: Vec<(String, String)> = self.base_env.clone();
        env.push(("MEOW_AGENT_ID".to_string(), agent_id.to_string()));
        for (key, value) in &spec.environment {
            env.push((key.clone(), value.clone()));
        }
        env.extend(extra_env.iter().cloned());

        let command = spec.spawn_command_for(&session_name);
        tracing::info!(
            agent = %agent_id,
            session = %session_name,
            adapter = %spec.name,
            "spawning agent session"
        );
        self.backend
            .spawn(&session_name, workdir, &command, &env)
            .await?;

        tokio::time::sleep(spec.startup_delay()).await;

        self.agents.lock().insert(
            agent_id.clone(),
            ManagedAgent {
                spec,
                session_name: session_name.clone(),
            },
        );
        Ok(session_name)
    }

    /// Re-register an agent whose session is already alive (resume path).
    ///
    /// No keystrokes are sent; the agent keeps whatever state it has.
    pub fn reattach(&self, agent_id: &AgentId, spec: AdapterSpec) {
        let session_name = self.session_name(agent_id);
        tracing::info!(agent = %agent_id, session = %session_name, "re-attaching to live session");
        self.agents.lock().insert(
            agent_id.clone(),
            ManagedAgent { spec, session_name },
        );
    }

    /// Inject prompt text following the adapter's injection protocol.
    pub async fn inject(&self, agent_id: &AgentId, text: &str) -> Result<(), ManagerError> {
        let (spec, session_name) = self.require(agent_id)?;
        let injection = &spec.prompt_injection;

        for key in &injection.pre_keys {
            self.backend.send_keys(&session_name, key).await?;
        }
        if !injection.pre_delay().is_zero() {
            tokio::time::sleep(injection.pre_delay()).await;
        }

        match injection.method {
            InjectionMethod::Literal => self.backend.send_literal(&session_name, text).await?,
            InjectionMethod::Paste => self.backend.paste(&session_name, text).await?,
        }

        if !injection.post_delay().is_zero() {
            tokio::time::sleep(injection.post_delay()).await;
        }
        for key in &injection.post_keys {
            self.backend.send_keys(&session_name, key).await?;
        }
        Ok(())
    }

    /// Stop an agent: graceful sends the adapter's stop keys and grants the
    /// grace period before the hard kill; non-graceful kills immediately.
    pub async fn stop(&self, agent_id: &AgentId, graceful: bool) -> Result<(), ManagerError> {
        let (spec, session_name) = self.require(agent_id)?;

        if graceful {
            for key in &spec.graceful_stop.keys {
                // The session may die between keys; that's a successful stop
                if self.backend.send_keys(&session_name, key).await.is_err() {
                    break;
                }
            }
            let deadline = tokio::time::Instant::now() + spec.graceful_stop.wait();
            while tokio::time::Instant::now() < deadline {
                if !self.backend.is_alive(&session_name).await.unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        if self.backend.is_alive(&session_name).await.unwrap_or(false) {
            self.backend.kill(&session_name).await?;
        }
        self.agents.lock().remove(agent_id);
        Ok(())
    }

    /// Liveness check on the agent's session.
    pub async fn is_alive(&self, agent_id: &AgentId) -> bool {
        let session_name = self.session_name(agent_id);
        self.backend.is_alive(&session_name).await.unwrap_or(false)
    }

    /// Enumerate live agents of this run, derived from session names.
    pub async fn list(&self) -> Result<Vec<AgentId>, ManagerError> {
        let prefix = self.prefix();
        let sessions = self.backend.list(&prefix).await?;
        Ok(sessions
            .iter()
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(AgentId::new)
            .collect())
    }

    /// Workdir-independent handle for the engine's resume path.
    pub fn backend(&self) -> &S {
        &self.backend
    }
}

/// Base environment every agent session receives.
pub fn engine_env(run_id: &RunId, socket_path: &Path) -> Vec<(String, String)> {
    vec![
        ("MEOW_RUN_ID".to_string(), run_id.to_string()),
        (
            "MEOW_SOCKET".to_string(),
            socket_path.to_string_lossy().to_string(),
        ),
    ]
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
