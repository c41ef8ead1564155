// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session backend for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{SessionBackend, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Spawn {
        name: String,
        cwd: PathBuf,
        cmd: String,
        env: Vec<(String, String)>,
    },
    SendKeys {
        name: String,
        keys: String,
    },
    SendLiteral {
        name: String,
        text: String,
    },
    Paste {
        name: String,
        text: String,
    },
    Kill {
        name: String,
    },
}

#[derive(Debug, Clone)]
struct FakeSession {
    alive: bool,
}

struct FakeBackendState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<SessionCall>,
    spawn_error: Option<String>,
}

/// Fake session backend: records calls, liveness is scripted.
#[derive(Clone)]
pub struct FakeSessionBackend {
    inner: Arc<Mutex<FakeBackendState>>,
}

impl Default for FakeSessionBackend {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeBackendState {
                sessions: HashMap::new(),
                calls: Vec::new(),
                spawn_error: None,
            })),
        }
    }
}

impl FakeSessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    /// All text injected into a session, in order (literal and paste).
    pub fn injected_text(&self, name: &str) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SessionCall::SendLiteral { name: n, text } if n == name => Some(text.clone()),
                SessionCall::Paste { name: n, text } if n == name => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Mark a session dead (simulates a crash).
    pub fn set_dead(&self, name: &str) {
        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.alive = false;
        }
    }

    /// Add a pre-existing session (for recovery tests).
    pub fn add_session(&self, name: &str, alive: bool) {
        self.inner
            .lock()
            .sessions
            .insert(name.to_string(), FakeSession { alive });
    }

    /// Fail the next spawn with the given message.
    pub fn set_spawn_error(&self, message: &str) {
        self.inner.lock().spawn_error = Some(message.to_string());
    }

    pub fn has_session(&self, name: &str) -> bool {
        self.inner
            .lock()
            .sessions
            .get(name)
            .map(|s| s.alive)
            .unwrap_or(false)
    }
}

#[async_trait]
impl SessionBackend for FakeSessionBackend {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Spawn {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            cmd: cmd.to_string(),
            env: env.to_vec(),
        });
        if let Some(message) = inner.spawn_error.take() {
            return Err(SessionError::SpawnFailed(message));
        }
        inner
            .sessions
            .insert(name.to_string(), FakeSession { alive: true });
        Ok(())
    }

    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::SendKeys {
            name: name.to_string(),
            keys: keys.to_string(),
        });
        if !inner.sessions.get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::SendLiteral {
            name: name.to_string(),
            text: text.to_string(),
        });
        if !inner.sessions.get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn paste(&self, name: &str, text: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Paste {
            name: name.to_string(),
            text: text.to_string(),
        });
        if !inner.sessions.get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Kill {
            name: name.to_string(),
        });
        if let Some(session) = inner.sessions.get_mut(name) {
            session.alive = false;
        }
        Ok(())
    }

    async fn is_alive(&self, name: &str) -> Result<bool, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .get(name)
            .map(|s| s.alive)
            .unwrap_or(false))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .iter()
            .filter(|(name, session)| session.alive && name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
