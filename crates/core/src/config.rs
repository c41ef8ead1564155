// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Directory layout follows the XDG conventions; every path can be overridden
//! through the `MEOW_*` environment variables listed in the field docs.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Run documents, sockets and lock files. `MEOW_RUNS_DIR`.
    pub runs_dir: PathBuf,
    /// Workflow files and collections. `MEOW_WORKFLOW_DIR`.
    pub workflow_dir: PathBuf,
    /// User adapter definitions. `MEOW_ADAPTER_DIR`.
    pub adapter_dir: PathBuf,
    /// Per-run log files.
    pub logs_dir: PathBuf,
    /// Alternate tmux socket name (tmux `-L`). `MEOW_TMUX_SOCKET`.
    pub tmux_socket: Option<String>,
    /// Session liveness poll interval.
    pub poll_interval: Duration,
    /// Effective timeout for agent steps with no explicit `timeout`.
    pub default_agent_timeout: Duration,
    /// Re-prompt budget before a validation failure becomes terminal.
    pub max_validation_attempts: u32,
}

impl Config {
    /// Resolve configuration from the environment.
    pub fn from_env() -> Self {
        let state_dir = state_dir();
        let config_dir = config_dir();
        Self {
            runs_dir: env_path("MEOW_RUNS_DIR").unwrap_or_else(|| state_dir.join("runs")),
            workflow_dir: env_path("MEOW_WORKFLOW_DIR")
                .unwrap_or_else(|| config_dir.join("workflows")),
            adapter_dir: env_path("MEOW_ADAPTER_DIR")
                .unwrap_or_else(|| config_dir.join("adapters")),
            logs_dir: state_dir.join("logs"),
            tmux_socket: std::env::var("MEOW_TMUX_SOCKET").ok().filter(|s| !s.is_empty()),
            poll_interval: Duration::from_millis(100),
            default_agent_timeout: Duration::from_secs(30 * 60),
            max_validation_attempts: 5,
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// State directory: `XDG_STATE_HOME/meow` or `~/.local/state/meow`.
fn state_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("meow");
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local/state/meow")
}

/// Config directory: `XDG_CONFIG_HOME/meow` or `~/.config/meow`.
fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meow")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
