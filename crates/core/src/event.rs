// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine events.
//!
//! Events are open-world: the core names a couple of types it routes itself
//! (`agent-stopped`, `agent-output`) and everything else is user-defined via
//! `meow event <type>`. The payload is a typed mapping, never a string blob.

use crate::id::AgentId;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Emitted when an agent session transitions to dead, and by the adapter's
/// stop-hook when the agent issues `meow done`.
pub const EVENT_AGENT_STOPPED: &str = "agent-stopped";

/// Emitted by `meow done` to hand outputs from an agent back into the engine.
pub const EVENT_AGENT_OUTPUT: &str = "agent-output";

/// Why an agent session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Done,
    Crashed,
    Killed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Done => write!(f, "done"),
            StopReason::Crashed => write!(f, "crashed"),
            StopReason::Killed => write!(f, "killed"),
        }
    }
}

/// A routed event: a type name plus a typed payload mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub payload: IndexMap<String, Value>,
}

impl EngineEvent {
    pub fn new(event_type: impl Into<String>, payload: IndexMap<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// `agent-stopped {agent_id, reason}`
    pub fn agent_stopped(agent_id: &AgentId, reason: StopReason) -> Self {
        let mut payload = IndexMap::new();
        payload.insert("agent_id".to_string(), Value::from(agent_id.as_str()));
        payload.insert("reason".to_string(), Value::from(reason.to_string()));
        Self::new(EVENT_AGENT_STOPPED, payload)
    }

    /// `agent-output {agent_id, outputs}`
    pub fn agent_output(agent_id: &AgentId, outputs: IndexMap<String, Value>) -> Self {
        let mut payload = IndexMap::new();
        payload.insert("agent_id".to_string(), Value::from(agent_id.as_str()));
        payload.insert("outputs".to_string(), Value::Object(outputs));
        Self::new(EVENT_AGENT_OUTPUT, payload)
    }

    /// The `agent_id` payload field, when present.
    pub fn agent_id(&self) -> Option<&str> {
        self.payload.get("agent_id").and_then(Value::as_str)
    }

    /// The `outputs` payload field as a mapping, when present.
    pub fn outputs(&self) -> Option<&IndexMap<String, Value>> {
        self.payload.get("outputs").and_then(Value::as_object)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
