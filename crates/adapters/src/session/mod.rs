// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexer session backends

mod tmux;

pub use tmux::TmuxBackend;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSessionBackend, SessionCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// A named, persistent terminal session substrate (tmux in production).
///
/// Session names are the sole identity; there is no PID tracking. A human
/// may attach to any session at any time, so "session alive" is the source
/// of truth for agent liveness.
#[async_trait]
pub trait SessionBackend: Clone + Send + Sync + 'static {
    /// Create a detached session running `cmd` in `cwd`.
    ///
    /// An env entry with an empty value unsets that variable in the pane.
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<(), SessionError>;

    /// Send named keys (tmux key syntax: "Enter", "C-c", "Escape").
    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), SessionError>;

    /// Send literal text, no key-name interpretation.
    async fn send_literal(&self, name: &str, text: &str) -> Result<(), SessionError>;

    /// Paste text as a single buffer (for TUIs with bracketed paste).
    async fn paste(&self, name: &str, text: &str) -> Result<(), SessionError>;

    /// Kill a session. Killing a dead session is not an error.
    async fn kill(&self, name: &str) -> Result<(), SessionError>;

    /// Check whether a session exists.
    async fn is_alive(&self, name: &str) -> Result<bool, SessionError>;

    /// Enumerate session names starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SessionError>;
}
