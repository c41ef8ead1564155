// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery: reconcile a persisted Run with reality on `resume`.
//!
//! The rules, per executor kind, for steps left `running`/`completing`:
//! shell, spawn, kill and branch conditions reset to pending (their commands
//! are assumed idempotent — side effects may replay); agent steps re-enter
//! their suspended state when the session is still alive, otherwise reset
//! with the agent marked stopped; expansion parents delete their children
//! and re-expand from scratch, which is safe because expansion is
//! deterministic.

use meow_adapters::{AdapterSpec, SessionBackend, SessionManager};
use meow_core::step::StepPayload;
use meow_core::{AgentId, AgentStatus, Config, Run, StepStatus};

/// Reconcile persisted step and agent state against live sessions.
///
/// Mutates the run in place; the caller persists afterwards.
pub async fn reconcile<S: SessionBackend>(
    run: &mut Run,
    sessions: &SessionManager<S>,
    config: &Config,
) {
    reattach_agents(run, sessions, config).await;

    let in_flight: Vec<String> = run
        .steps
        .values()
        .filter(|s| s.status.is_in_flight())
        .map(|s| s.id.to_string())
        .collect();

    for step_id in in_flight {
        let Some(step) = run.get_step(&step_id) else {
            // Already deleted as part of a parent's re-expansion
            continue;
        };
        match &step.payload {
            StepPayload::Shell { .. }
            | StepPayload::Spawn { .. }
            | StepPayload::Kill { .. } => {
                tracing::warn!(
                    step = %step_id,
                    "resetting interrupted step; side effects may replay"
                );
                reset_step(run, &step_id);
            }
            StepPayload::Agent { agent, .. } => {
                let agent = agent.clone();
                if run.agent_is_active(&agent) {
                    // Session survived: the scheduler re-registers the
                    // waiter and the step stays suspended
                    tracing::info!(step = %step_id, agent = %agent, "agent session alive, staying suspended");
                    if let Some(step) = run.get_step_mut(&step_id) {
                        step.status = StepStatus::Running;
                    }
                } else {
                    tracing::warn!(
                        step = %step_id,
                        agent = %agent,
                        "agent session gone, resetting step"
                    );
                    reset_step(run, &step_id);
                    if let Some(info) = run.get_agent_mut(&agent) {
                        info.status = AgentStatus::Stopped;
                        info.current_step = None;
                    }
                }
            }
            StepPayload::Expand { .. }
            | StepPayload::Foreach { .. }
            | StepPayload::Branch { .. } => {
                tracing::info!(step = %step_id, "deleting partial expansion for re-expansion");
                delete_children(run, &step_id);
                reset_step(run, &step_id);
            }
        }
    }
}

/// Check each recorded agent against its session; re-attach live ones to
/// the session manager, mark dead ones stopped.
async fn reattach_agents<S: SessionBackend>(
    run: &mut Run,
    sessions: &SessionManager<S>,
    config: &Config,
) {
    let agents: Vec<(String, String)> = run
        .agents
        .iter()
        .filter(|(_, info)| info.status != AgentStatus::Stopped)
        .map(|(id, info)| (id.clone(), info.adapter.clone()))
        .collect();

    for (agent, adapter) in agents {
        let agent_id = AgentId::new(agent.clone());
        if sessions.is_alive(&agent_id).await {
            match AdapterSpec::load(&config.adapter_dir, &adapter) {
                Ok(spec) => sessions.reattach(&agent_id, spec),
                Err(e) => {
                    tracing::error!(agent = %agent, error = %e, "adapter unavailable on resume");
                    if let Some(info) = run.get_agent_mut(&agent) {
                        info.status = AgentStatus::Stopped;
                    }
                }
            }
        } else {
            tracing::warn!(agent = %agent, "agent session did not survive restart");
            if let Some(info) = run.get_agent_mut(&agent) {
                info.status = AgentStatus::Stopped;
                info.current_step = None;
            }
        }
    }
}

fn reset_step(run: &mut Run, step_id: &str) {
    if let Some(step) = run.get_step_mut(step_id) {
        step.status = StepStatus::Pending;
        step.outputs.clear();
        step.error = None;
        step.attempts = 0;
    }
}

/// Delete a parent's expansion subtree and clear the forward link.
fn delete_children(run: &mut Run, parent_id: &str) {
    let mut to_delete = Vec::new();
    let mut stack: Vec<String> = run
        .get_step(parent_id)
        .map(|p| p.expanded_into.iter().map(|c| c.to_string()).collect())
        .unwrap_or_default();

    while let Some(child_id) = stack.pop() {
        if let Some(child) = run.get_step(&child_id) {
            stack.extend(child.expanded_into.iter().map(|c| c.to_string()));
        }
        to_delete.push(child_id);
    }

    for child_id in to_delete {
        run.steps.shift_remove(&child_id);
    }
    if let Some(parent) = run.get_step_mut(parent_id) {
        parent.expanded_into.clear();
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
