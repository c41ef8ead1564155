// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative agent adapter specifications.
//!
//! An adapter is pure configuration: the session manager interprets it, the
//! engine never sees agent-class specifics. User-defined adapters live as
//! TOML files in the adapter directory and shadow the built-ins by name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from adapter loading
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("unknown adapter: {0}")]
    Unknown(String),

    #[error("invalid adapter file {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How prompt text is delivered into the pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMethod {
    /// `send-keys -l` — keystroke-by-keystroke literal text
    #[default]
    Literal,
    /// load-buffer + paste-buffer — single paste, survives bracketed-paste TUIs
    Paste,
}

/// Prompt injection protocol: keys before, text, keys after, with pauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInjection {
    /// Key names sent before the text (e.g. "Escape" to leave a menu)
    #[serde(default)]
    pub pre_keys: Vec<String>,
    #[serde(default)]
    pub pre_delay_ms: u64,
    #[serde(default)]
    pub method: InjectionMethod,
    /// Key names sent after the text (usually "Enter")
    #[serde(default = "default_post_keys")]
    pub post_keys: Vec<String>,
    #[serde(default)]
    pub post_delay_ms: u64,
}

fn default_post_keys() -> Vec<String> {
    vec!["Enter".to_string()]
}

impl Default for PromptInjection {
    fn default() -> Self {
        Self {
            pre_keys: Vec::new(),
            pre_delay_ms: 0,
            method: InjectionMethod::Literal,
            post_keys: default_post_keys(),
            post_delay_ms: 0,
        }
    }
}

impl PromptInjection {
    pub fn pre_delay(&self) -> Duration {
        Duration::from_millis(self.pre_delay_ms)
    }

    pub fn post_delay(&self) -> Duration {
        Duration::from_millis(self.post_delay_ms)
    }
}

/// Graceful-stop protocol: keys, then a grace period before hard kill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GracefulStop {
    /// Key names sent to request shutdown (e.g. ["C-c"])
    #[serde(default = "default_stop_keys")]
    pub keys: Vec<String>,
    #[serde(default = "default_stop_wait_ms")]
    pub wait_ms: u64,
}

fn default_stop_keys() -> Vec<String> {
    vec!["C-c".to_string()]
}

fn default_stop_wait_ms() -> u64 {
    5_000
}

impl Default for GracefulStop {
    fn default() -> Self {
        Self {
            keys: default_stop_keys(),
            wait_ms: default_stop_wait_ms(),
        }
    }
}

impl GracefulStop {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

/// Immutable configuration for one agent class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub name: String,
    /// Command run in the fresh pane. `{{session_id}}` is replaced with the
    /// multiplexer session name.
    pub spawn_command: String,
    /// Command used when re-attaching to an existing agent conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_command: Option<String>,
    /// Wait after spawn before the first keystroke.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    /// Variables injected into the session environment. An empty value means
    /// "unset the variable".
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub prompt_injection: PromptInjection,
    #[serde(default)]
    pub graceful_stop: GracefulStop,
    /// Optional external script translating agent-native hooks into
    /// `meow event` invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_translator: Option<PathBuf>,
}

fn default_startup_delay_ms() -> u64 {
    1_000
}

impl AdapterSpec {
    /// Built-in adapter for Claude Code.
    pub fn claude() -> Self {
        Self {
            name: "claude".to_string(),
            spawn_command: "claude --session-id {{session_id}}".to_string(),
            resume_command: Some("claude --resume {{session_id}}".to_string()),
            startup_delay_ms: 2_000,
            environment: IndexMap::new(),
            prompt_injection: PromptInjection {
                pre_keys: Vec::new(),
                pre_delay_ms: 200,
                method: InjectionMethod::Paste,
                post_keys: vec!["Enter".to_string()],
                post_delay_ms: 300,
            },
            graceful_stop: GracefulStop {
                keys: vec!["C-c".to_string(), "C-c".to_string()],
                wait_ms: 5_000,
            },
            event_translator: None,
        }
    }

    /// Built-in test adapter: a bare shell pane.
    ///
    /// Tests drive it by injecting shell commands as "prompts"; `meow done`
    /// and `meow event` work from inside it like from any real agent.
    pub fn simulator() -> Self {
        Self {
            name: "simulator".to_string(),
            spawn_command: "bash".to_string(),
            resume_command: None,
            startup_delay_ms: 100,
            environment: IndexMap::new(),
            prompt_injection: PromptInjection::default(),
            graceful_stop: GracefulStop {
                keys: vec!["C-c".to_string()],
                wait_ms: 500,
            },
            event_translator: None,
        }
    }

    /// Load an adapter by name: a user-defined `<adapter_dir>/<name>.toml`
    /// shadows the built-ins; otherwise fall back to `claude`/`simulator`.
    pub fn load(adapter_dir: &Path, name: &str) -> Result<Self, SpecError> {
        let path = adapter_dir.join(format!("{}.toml", name));
        if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            let mut spec: AdapterSpec =
                toml::from_str(&content).map_err(|e| SpecError::Invalid {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            // File name wins over any name field inside the file
            spec.name = name.to_string();
            return Ok(spec);
        }
        match name {
            "claude" => Ok(Self::claude()),
            "simulator" => Ok(Self::simulator()),
            other => Err(SpecError::Unknown(other.to_string())),
        }
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Spawn command with the session name substituted.
    pub fn spawn_command_for(&self, session_id: &str) -> String {
        self.spawn_command.replace("{{session_id}}", session_id)
    }

    /// Resume command with the session name substituted, when defined.
    pub fn resume_command_for(&self, session_id: &str) -> Option<String> {
        self.resume_command
            .as_ref()
            .map(|cmd| cmd.replace("{{session_id}}", session_id))
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
