// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn agent_stopped_shape() {
    let event = EngineEvent::agent_stopped(&AgentId::new("worker"), StopReason::Crashed);
    assert_eq!(event.event_type, EVENT_AGENT_STOPPED);
    assert_eq!(event.agent_id(), Some("worker"));
    assert_eq!(
        event.payload.get("reason"),
        Some(&Value::from("crashed"))
    );
}

#[test]
fn agent_output_carries_typed_outputs() {
    let mut outputs = IndexMap::new();
    outputs.insert("task_id".to_string(), Value::from("PROJ-123"));
    outputs.insert("count".to_string(), Value::Integer(2));
    let event = EngineEvent::agent_output(&AgentId::new("worker"), outputs);

    assert_eq!(event.event_type, EVENT_AGENT_OUTPUT);
    let outputs = event.outputs().unwrap();
    assert_eq!(outputs.get("count"), Some(&Value::Integer(2)));
}

#[test]
fn event_serde_roundtrip() {
    let mut payload = IndexMap::new();
    payload.insert("ticket".to_string(), Value::from("T-9"));
    let event = EngineEvent::new("review-requested", payload);

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains(r#""type":"review-requested""#));
    let back: EngineEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn empty_payload_omitted_from_json() {
    let event = EngineEvent::new("ping", IndexMap::new());
    let json = serde_json::to_string(&event).unwrap();
    assert_eq!(json, r#"{"type":"ping"}"#);
}

#[test]
fn accessors_absent_on_foreign_events() {
    let event = EngineEvent::new("custom", IndexMap::new());
    assert_eq!(event.agent_id(), None);
    assert_eq!(event.outputs(), None);
}
