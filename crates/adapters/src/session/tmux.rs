// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux session backend

use super::{SessionBackend, SessionError};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Tmux-based session backend.
///
/// An alternate socket name (`MEOW_TMUX_SOCKET`) isolates the orchestrator's
/// sessions from the user's own tmux server; tests rely on this.
#[derive(Clone, Default)]
pub struct TmuxBackend {
    socket: Option<String>,
}

impl TmuxBackend {
    pub fn new(socket: Option<String>) -> Self {
        Self { socket }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("tmux");
        if let Some(socket) = &self.socket {
            cmd.arg("-L").arg(socket);
        }
        cmd
    }
}

#[async_trait]
impl SessionBackend for TmuxBackend {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<(), SessionError> {
        // Precondition: cwd must exist
        if !cwd.exists() {
            return Err(SessionError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        // A leftover session with this name is stale state from a crashed
        // run; replace it.
        let existing = self
            .command()
            .args(["has-session", "-t", name])
            .output()
            .await;
        if existing.map(|o| o.status.success()).unwrap_or(false) {
            tracing::warn!(session = name, "session already exists, killing first");
            let _ = self
                .command()
                .args(["kill-session", "-t", name])
                .output()
                .await;
        }

        let mut tmux_cmd = self.command();
        tmux_cmd
            .arg("new-session")
            .arg("-d")
            .arg("-s")
            .arg(name)
            .arg("-c")
            .arg(cwd);

        // tmux `-e VAR=value` sets, `-e VAR` (no value) removes
        for (key, value) in env {
            if value.is_empty() {
                tmux_cmd.arg("-e").arg(key);
            } else {
                tmux_cmd.arg("-e").arg(format!("{}={}", key, value));
            }
        }

        tmux_cmd.arg(cmd);

        let output = tmux_cmd
            .output()
            .await
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(session = name, stderr = %stderr, "tmux spawn failed");
            return Err(SessionError::SpawnFailed(stderr.to_string()));
        }

        // Log stderr even on success - may contain useful warnings
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(session = name, stderr = %stderr, "tmux spawn stderr (non-fatal)");
        }

        Ok(())
    }

    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), SessionError> {
        let output = self
            .command()
            .args(["send-keys", "-t", name, keys])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), SessionError> {
        // -l = literal mode (no key name interpretation)
        // -- = end of options (handles text starting with -)
        let output = self
            .command()
            .args(["send-keys", "-t", name, "-l", "--", text])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn paste(&self, name: &str, text: &str) -> Result<(), SessionError> {
        // load-buffer from stdin, then paste-buffer -p for bracketed paste
        use tokio::io::AsyncWriteExt;

        let mut load = self
            .command()
            .args(["load-buffer", "-b", "meow-paste", "-"])
            .stdin(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        if let Some(mut stdin) = load.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        }
        let status = load
            .wait()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !status.success() {
            return Err(SessionError::CommandFailed(
                "tmux load-buffer failed".to_string(),
            ));
        }

        let output = self
            .command()
            .args(["paste-buffer", "-p", "-d", "-b", "meow-paste", "-t", name])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), SessionError> {
        let output = self
            .command()
            .args(["kill-session", "-t", name])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            // Session might already be dead, which is fine
        }
        Ok(())
    }

    async fn is_alive(&self, name: &str) -> Result<bool, SessionError> {
        let output = self
            .command()
            .args(["has-session", "-t", name])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        Ok(output.status.success())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let output = self
            .command()
            .args(["list-sessions", "-F", "#{session_name}"])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;

        // No server running means no sessions
        if !output.status.success() {
            return Ok(Vec::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| line.starts_with(prefix))
            .map(|line| line.to_string())
            .collect())
    }
}
