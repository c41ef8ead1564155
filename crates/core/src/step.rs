// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step node: status machine, executor payloads, expansion links.

use crate::id::StepId;
use crate::template::StepDef;
use crate::value::{Value, ValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a step within a run.
///
/// `Completing` is the window between "agent reported done" and "outputs
/// validated and persisted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completing,
    Done,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Terminal statuses never transition again (outside recovery).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Done | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Done or policy-skipped; satisfies a dependency edge.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Skipped)
    }

    /// Steps in these statuses are owned by an in-flight executor task and
    /// must never be re-dispatched.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, StepStatus::Running | StepStatus::Completing)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completing => write!(f, "completing"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Shell command exited non-zero
    Exit,
    /// Step timer fired
    Timeout,
    /// Output validator gave up after retries
    Validation,
    /// Session vanished while the step was running
    AgentCrashed,
    /// Variable resolution failure
    Bind,
    /// Preconditions violated at dispatch (dead agent, unknown template)
    Dispatch,
    /// Unexpected executor failure
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Exit => write!(f, "exit"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::AgentCrashed => write!(f, "agent_crashed"),
            ErrorKind::Bind => write!(f, "bind"),
            ErrorKind::Dispatch => write!(f, "dispatch"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Failure record attached to a terminal-failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub attempts: u32,
}

/// Failure policy for a step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OnError {
    /// Fail the run (no further dispatch; in-flight steps finish)
    #[default]
    Fail,
    /// Mark the step failed and keep going
    Continue,
    /// Expand the named recovery template as children of the failed step
    Recover(String),
}

impl Serialize for OnError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OnError::Fail => serializer.serialize_str("fail"),
            OnError::Continue => serializer.serialize_str("continue"),
            OnError::Recover(template) => serializer.serialize_str(template),
        }
    }
}

impl<'de> Deserialize<'de> for OnError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "fail" => OnError::Fail,
            "continue" => OnError::Continue,
            _ => OnError::Recover(s),
        })
    }
}

/// Which stream of a shell step an output is captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellOutputSource {
    Stdout,
    Stderr,
    ExitCode,
}

/// Post-capture parse applied to a shell output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureParse {
    /// Attempt JSON parse; fall back to the raw string on failure
    Json,
}

/// Capture specification for one named shell output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutputSpec {
    pub source: ShellOutputSource,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parse: Option<CaptureParse>,
}

/// Declared schema for one named agent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One arm of a branch step: inline steps or a template reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchArm {
    Template(String),
    Steps(Vec<StepDef>),
}

/// Executor-specific payload, tagged by executor kind.
///
/// This is the shape step tables take in workflow files (flattened into the
/// step definition) and the shape persisted under `payload` in Run documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "snake_case")]
pub enum StepPayload {
    Shell {
        command: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        outputs: IndexMap<String, ShellOutputSpec>,
    },
    Spawn {
        agent: String,
        #[serde(default = "default_adapter")]
        adapter: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<String>,
    },
    Agent {
        agent: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        outputs: IndexMap<String, OutputSchema>,
    },
    Kill {
        agent: String,
        #[serde(default = "default_true")]
        graceful: bool,
    },
    Expand {
        template: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        variables: IndexMap<String, String>,
    },
    Foreach {
        items: String,
        #[serde(default = "default_item_var")]
        item_var: String,
        #[serde(default = "default_index_var")]
        index_var: String,
        template: String,
    },
    Branch {
        condition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_true: Option<BranchArm>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_false: Option<BranchArm>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_timeout: Option<BranchArm>,
    },
}

fn default_adapter() -> String {
    "claude".to_string()
}

fn default_true() -> bool {
    true
}

fn default_item_var() -> String {
    "item".to_string()
}

fn default_index_var() -> String {
    "index".to_string()
}

/// Tag-only variant of [`StepPayload`] for dispatch tables and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Shell,
    Spawn,
    Agent,
    Kill,
    Expand,
    Foreach,
    Branch,
}

impl From<&StepPayload> for ExecutorKind {
    fn from(payload: &StepPayload) -> Self {
        match payload {
            StepPayload::Shell { .. } => ExecutorKind::Shell,
            StepPayload::Spawn { .. } => ExecutorKind::Spawn,
            StepPayload::Agent { .. } => ExecutorKind::Agent,
            StepPayload::Kill { .. } => ExecutorKind::Kill,
            StepPayload::Expand { .. } => ExecutorKind::Expand,
            StepPayload::Foreach { .. } => ExecutorKind::Foreach,
            StepPayload::Branch { .. } => ExecutorKind::Branch,
        }
    }
}

impl ExecutorKind {
    /// Control-flow kinds expand into children instead of doing work directly.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            ExecutorKind::Expand | ExecutorKind::Foreach | ExecutorKind::Branch
        )
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::Shell => write!(f, "shell"),
            ExecutorKind::Spawn => write!(f, "spawn"),
            ExecutorKind::Agent => write!(f, "agent"),
            ExecutorKind::Kill => write!(f, "kill"),
            ExecutorKind::Expand => write!(f, "expand"),
            ExecutorKind::Foreach => write!(f, "foreach"),
            ExecutorKind::Branch => write!(f, "branch"),
        }
    }
}

/// A single node in a run's DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub payload: StepPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<StepId>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Per-step variable overlay, populated by expansion.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scope: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_from: Option<StepId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expanded_into: Vec<StepId>,
    /// Prompt injections so far (bumped on each validation retry).
    #[serde(default)]
    pub attempts: u32,
}

impl Step {
    /// Create a pending step with no dependencies.
    pub fn new(id: impl Into<StepId>, payload: StepPayload) -> Self {
        Self {
            id: id.into(),
            payload,
            needs: Vec::new(),
            status: StepStatus::Pending,
            outputs: IndexMap::new(),
            error: None,
            on_error: OnError::Fail,
            timeout: None,
            scope: IndexMap::new(),
            expanded_from: None,
            expanded_into: Vec::new(),
            attempts: 0,
        }
    }

    pub fn with_needs(mut self, needs: Vec<StepId>) -> Self {
        self.needs = needs;
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn executor(&self) -> ExecutorKind {
        ExecutorKind::from(&self.payload)
    }

    /// Record a terminal failure.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(StepError {
            kind,
            message: message.into(),
            attempts: self.attempts,
        });
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
