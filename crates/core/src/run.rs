// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record: one execution of a workflow.

use crate::id::{AgentId, RunId, StepId};
use crate::step::{Step, StepStatus};
use crate::value::Value;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Done | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Done => write!(f, "done"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of an agent session within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Session spawned, startup delay not yet elapsed
    Starting,
    /// Session alive and accepting prompts
    Active,
    /// Session dead (stopped, killed, or crashed)
    Stopped,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Starting => write!(f, "starting"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Book-keeping for one agent hosted in a multiplexer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub session_name: String,
    pub adapter: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepId>,
}

/// One execution of a workflow: the single shared mutable document the
/// scheduler owns and the state store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    /// Origin workflow path or collection reference
    pub template: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub steps: IndexMap<String, Step>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub agents: IndexMap<String, AgentInfo>,
}

impl Run {
    /// Create a pending run with no steps.
    pub fn new(id: RunId, template: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            template: template.into(),
            status: RunStatus::Pending,
            started_at,
            completed_at: None,
            variables: IndexMap::new(),
            steps: IndexMap::new(),
            agents: IndexMap::new(),
        }
    }

    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn get_step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.get_mut(id)
    }

    /// Insert a step, keyed by its id.
    pub fn insert_step(&mut self, step: Step) {
        self.steps.insert(step.id.to_string(), step);
    }

    pub fn get_agent(&self, id: &str) -> Option<&AgentInfo> {
        self.agents.get(id)
    }

    pub fn get_agent_mut(&mut self, id: &str) -> Option<&mut AgentInfo> {
        self.agents.get_mut(id)
    }

    /// An agent is usable by agent steps only while `Active`.
    pub fn agent_is_active(&self, id: &str) -> bool {
        self.get_agent(id)
            .map(|a| a.status == AgentStatus::Active)
            .unwrap_or(false)
    }

    /// Children of an expansion parent, in insertion order.
    pub fn children_of(&self, parent: &StepId) -> Vec<&Step> {
        self.get_step(parent.as_str())
            .map(|p| {
                p.expanded_into
                    .iter()
                    .filter_map(|child| self.get_step(child.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when every step is terminal.
    pub fn all_steps_terminal(&self) -> bool {
        self.steps.values().all(|s| s.status.is_terminal())
    }

    /// True when any step is running or completing.
    pub fn has_in_flight_steps(&self) -> bool {
        self.steps.values().any(|s| s.status.is_in_flight())
    }

    /// Multiplexer session prefix for this run's agents.
    pub fn session_prefix(&self) -> String {
        format!("meow-{}-", self.id)
    }

    /// Session name for one agent of this run.
    pub fn session_name(&self, agent_id: &AgentId) -> String {
        format!("meow-{}-{}", self.id, agent_id)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
