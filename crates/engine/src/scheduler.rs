// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: a single tick loop cooperating with parallel executor
//! tasks.
//!
//! The Run document is owned here and mutated only on dispatch and result
//! processing; executor tasks communicate exclusively through the result
//! channel. Suspended agent steps are entries in a wait-map (registration in
//! the event router plus a deadline), never parked continuations — the
//! completion path is the same whether a step resolves via event, timeout,
//! or cancellation.

use crate::binder::{bind_string, bind_to_string, Env};
use crate::error::EngineError;
use crate::executors::{
    agent as agent_exec, expand as expand_exec, shell as shell_exec, ConditionOutcome, ExecOutcome,
    StepResult,
};
use crate::ipc::IpcListener;
use crate::recovery;
use crate::router::{EventRouter, Outcome, Predicate};
use crate::validator::validate_outputs;
use indexmap::IndexMap;
use meow_adapters::{engine_env, AdapterSpec, SessionBackend, SessionManager};
use meow_core::step::{BranchArm, StepPayload};
use meow_core::template::Template;
use meow_core::{
    AgentId, AgentInfo, AgentStatus, Clock, Config, EngineEvent, ErrorKind, OnError, Run, RunId,
    RunStatus, Step, StepId, StepStatus, StopReason, Value, WorkflowFile, EVENT_AGENT_OUTPUT,
};
use meow_storage::{RunLock, RunStore};
use meow_workflow::{resolve_variables, TemplateRef};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the executor result channel.
const RESULT_CHANNEL_CAPACITY: usize = 256;

/// External dependencies the engine is constructed from.
pub struct EngineDeps<S: SessionBackend, C: Clock> {
    pub backend: S,
    pub clock: C,
    pub config: Config,
}

/// A suspended agent step: the data form of its suspension.
struct WaitEntry {
    agent_id: AgentId,
    deadline: tokio::time::Instant,
    /// Bound prompt, kept for validation re-injection.
    prompt: String,
    wait_cancel: CancellationToken,
}

/// The orchestrator engine for one Run.
pub struct Engine<S: SessionBackend, C: Clock> {
    config: Config,
    store: RunStore,
    _lock: RunLock,
    run: Run,
    workflow: WorkflowFile,
    router: EventRouter,
    sessions: Arc<SessionManager<S>>,
    clock: C,
    cancel: CancellationToken,
    result_tx: mpsc::Sender<StepResult>,
    result_rx: mpsc::Receiver<StepResult>,
    waits: HashMap<String, WaitEntry>,
    /// A Fail-policy failure froze dispatch; in-flight steps drain.
    halted: bool,
}

impl<S, C> Engine<S, C>
where
    S: SessionBackend,
    C: Clock,
{
    /// Create a fresh run from a parsed workflow and start tracking it.
    pub fn create(
        deps: EngineDeps<S, C>,
        workflow: WorkflowFile,
        origin: impl Into<String>,
        provided: IndexMap<String, Value>,
    ) -> Result<Self, EngineError> {
        let EngineDeps {
            backend,
            clock,
            config,
        } = deps;
        let store = RunStore::new(config.runs_dir.clone());

        let main = workflow
            .main()
            .ok_or_else(|| EngineError::Workflow("workflow has no [main] template".to_string()))?;
        let variables = resolve_variables(main, provided)?;

        let run_id = RunId::generate(clock.epoch_ms());
        let mut run = Run::new(run_id.clone(), origin, chrono::Utc::now());
        run.variables = variables;
        for def in &main.steps {
            run.insert_step(def.instantiate(None, IndexMap::new()));
        }

        let lock = RunLock::acquire(&store, &run_id)?;
        store.save(&run)?;

        Ok(Self::assemble(config, store, lock, run, workflow, backend, clock))
    }

    /// Resume a persisted run: load, reconcile against reality, continue.
    pub async fn resume(deps: EngineDeps<S, C>, run_id: &RunId) -> Result<Self, EngineError> {
        let EngineDeps {
            backend,
            clock,
            config,
        } = deps;
        let store = RunStore::new(config.runs_dir.clone());

        let mut run = store.load(run_id)?;
        if run.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(run_id.clone()));
        }
        let lock = RunLock::acquire(&store, run_id)?;
        store.remove_stale_socket(run_id)?;

        let workflow = load_origin_workflow(&run)?;
        let mut engine = Self::assemble(config, store, lock, run, workflow, backend, clock);
        recovery::reconcile(&mut engine.run, engine.sessions.as_ref(), &engine.config).await;
        engine.store.save(&engine.run)?;
        Ok(engine)
    }

    fn assemble(
        config: Config,
        store: RunStore,
        lock: RunLock,
        run: Run,
        workflow: WorkflowFile,
        backend: S,
        clock: C,
    ) -> Self {
        let router = EventRouter::new();
        let socket_path = store.socket_path(&run.id);
        let sessions = Arc::new(SessionManager::new(
            backend,
            run.id.clone(),
            engine_env(&run.id, &socket_path),
            config.poll_interval,
        ));
        let (result_tx, result_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            config,
            store,
            _lock: lock,
            run,
            workflow,
            router,
            sessions,
            clock,
            cancel: CancellationToken::new(),
            result_tx,
            result_rx,
            waits: HashMap::new(),
            halted: false,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run.id
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Token that cancels the engine and everything it spawned.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the run to a terminal status.
    pub async fn run_to_completion(&mut self) -> Result<RunStatus, EngineError> {
        let listener = IpcListener::bind(
            &self.store.socket_path(&self.run.id),
            self.router.clone(),
            self.cancel.child_token(),
        )
        .map_err(|e| EngineError::Ipc(e.to_string()))?;
        tokio::spawn(listener.run());

        self.run.status = RunStatus::Running;
        self.persist()?;
        self.rehydrate_waits();

        loop {
            if !self.halted {
                self.dispatch_ready().await?;
            }
            if self.finished() {
                break;
            }

            tokio::select! {
                maybe = self.result_rx.recv() => {
                    if let Some(result) = maybe {
                        self.process_result(result).await?;
                        while let Ok(result) = self.result_rx.try_recv() {
                            self.process_result(result).await?;
                        }
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.check_agent_liveness().await?;
                }
                _ = self.cancel.cancelled() => {
                    return self.finish_cancelled().await;
                }
            }
        }

        self.finish().await
    }

    /// Cancel the engine from outside (ctrl-c handler).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    // === Ready computation & dispatch ===

    /// Steps eligible for dispatch this tick.
    fn dispatchable(&self) -> Vec<StepId> {
        self.run
            .steps
            .values()
            .filter(|step| step.status == StepStatus::Pending && self.needs_satisfied(step))
            .map(|step| step.id.clone())
            .collect()
    }

    fn needs_satisfied(&self, step: &Step) -> bool {
        step.needs.iter().all(|need| {
            match self.run.get_step(need.as_str()) {
                Some(dep) => match dep.status {
                    StepStatus::Done | StepStatus::Skipped => true,
                    // on_error=continue relaxation (recover counts: the
                    // failure is handled by the recovery children)
                    StepStatus::Failed => {
                        matches!(dep.on_error, OnError::Continue | OnError::Recover(_))
                    }
                    _ => false,
                },
                None => false,
            }
        })
    }

    async fn dispatch_ready(&mut self) -> Result<(), EngineError> {
        loop {
            let ready = self.dispatchable();
            if ready.is_empty() {
                return Ok(());
            }
            for step_id in ready {
                self.dispatch(&step_id).await?;
                if self.halted {
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch(&mut self, step_id: &StepId) -> Result<(), EngineError> {
        let Some(step) = self.run.get_step(step_id.as_str()) else {
            return Ok(());
        };
        let payload = step.payload.clone();
        tracing::info!(step = %step_id, executor = %step.executor(), "dispatching");

        match payload {
            StepPayload::Shell { command, outputs } => {
                self.dispatch_shell(step_id, command, outputs).await
            }
            StepPayload::Spawn {
                agent,
                adapter,
                workdir,
            } => self.dispatch_spawn(step_id, agent, adapter, workdir).await,
            StepPayload::Agent { agent, prompt, .. } => {
                self.dispatch_agent(step_id, agent, prompt).await
            }
            StepPayload::Kill { agent, graceful } => {
                self.dispatch_kill(step_id, agent, graceful).await
            }
            StepPayload::Expand {
                template,
                variables,
            } => self.dispatch_expand(step_id, template, variables).await,
            StepPayload::Foreach {
                items,
                item_var,
                index_var,
                template,
            } => {
                self.dispatch_foreach(step_id, items, item_var, index_var, template)
                    .await
            }
            StepPayload::Branch { condition, .. } => {
                self.dispatch_branch(step_id, condition).await
            }
        }
    }

    async fn dispatch_shell(
        &mut self,
        step_id: &StepId,
        command: String,
        outputs: IndexMap<String, meow_core::step::ShellOutputSpec>,
    ) -> Result<(), EngineError> {
        let env = self.env_for(step_id);
        let bound = match bind_to_string(&env, &command) {
            Ok(bound) => bound,
            Err(e) => return self.fail_step(step_id, ErrorKind::Bind, e.to_string()).await,
        };

        // Snapshot the bound command so recovery replays the same thing
        if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
            step.payload = StepPayload::Shell {
                command: bound.clone(),
                outputs: outputs.clone(),
            };
        }
        let timeout = self.step_timeout(step_id);
        self.mark_running(step_id)?;

        let tx = self.result_tx.clone();
        let id = step_id.clone();
        let child_env = self.child_env();
        let cwd = working_dir();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let outcome = shell_exec::run_shell(bound, cwd, child_env, outputs, timeout, cancel).await;
            let _ = tx.send(StepResult::new(id, outcome)).await;
        });
        Ok(())
    }

    async fn dispatch_spawn(
        &mut self,
        step_id: &StepId,
        agent: String,
        adapter: String,
        workdir: Option<String>,
    ) -> Result<(), EngineError> {
        let spec = match AdapterSpec::load(&self.config.adapter_dir, &adapter) {
            Ok(spec) => spec,
            Err(e) => {
                return self
                    .fail_step(step_id, ErrorKind::Dispatch, e.to_string())
                    .await
            }
        };
        let env = self.env_for(step_id);
        let workdir = match workdir {
            Some(raw) => match bind_to_string(&env, &raw) {
                Ok(bound) => PathBuf::from(bound),
                Err(e) => {
                    return self.fail_step(step_id, ErrorKind::Bind, e.to_string()).await
                }
            },
            None => working_dir(),
        };
        self.mark_running(step_id)?;

        let tx = self.result_tx.clone();
        let id = step_id.clone();
        let sessions = Arc::clone(&self.sessions);
        let agent_id = AgentId::new(agent);
        tokio::spawn(async move {
            let outcome = agent_exec::spawn_agent(sessions, agent_id, spec, workdir).await;
            let _ = tx.send(StepResult::new(id, outcome)).await;
        });
        Ok(())
    }

    async fn dispatch_agent(
        &mut self,
        step_id: &StepId,
        agent: String,
        prompt: String,
    ) -> Result<(), EngineError> {
        if !self.run.agent_is_active(&agent) {
            return self
                .fail_step(
                    step_id,
                    ErrorKind::Dispatch,
                    format!("agent '{}' is not active", agent),
                )
                .await;
        }

        let env = self.env_for(step_id);
        let bound = match bind_to_string(&env, &prompt) {
            Ok(bound) => bound,
            Err(e) => return self.fail_step(step_id, ErrorKind::Bind, e.to_string()).await,
        };

        let timeout = self
            .step_timeout(step_id)
            .unwrap_or(self.config.default_agent_timeout);
        let agent_id = AgentId::new(agent.clone());

        // Snapshot the bound prompt; count the first injection
        if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
            if let StepPayload::Agent {
                prompt: stored_prompt,
                ..
            } = &mut step.payload
            {
                *stored_prompt = bound.clone();
            }
            step.attempts = 1;
        }
        if let Some(info) = self.run.get_agent_mut(&agent) {
            info.current_step = Some(step_id.clone());
        }
        self.mark_running(step_id)?;

        // Waiter before injection: an instant reply must not be lost
        self.register_wait(step_id, &agent_id, timeout, bound.clone());

        let tx = self.result_tx.clone();
        let id = step_id.clone();
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let outcome = agent_exec::inject_prompt(sessions, agent_id, bound).await;
            let _ = tx.send(StepResult::new(id, outcome)).await;
        });
        Ok(())
    }

    async fn dispatch_kill(
        &mut self,
        step_id: &StepId,
        agent: String,
        graceful: bool,
    ) -> Result<(), EngineError> {
        self.mark_running(step_id)?;

        let tx = self.result_tx.clone();
        let id = step_id.clone();
        let sessions = Arc::clone(&self.sessions);
        let agent_id = AgentId::new(agent);
        tokio::spawn(async move {
            let outcome = agent_exec::stop_agent(sessions, agent_id, graceful).await;
            let _ = tx.send(StepResult::new(id, outcome)).await;
        });
        Ok(())
    }

    async fn dispatch_expand(
        &mut self,
        step_id: &StepId,
        template_ref: String,
        variables: IndexMap<String, String>,
    ) -> Result<(), EngineError> {
        let env = self.env_for(step_id);

        // Bind pass-through variables with types preserved
        let mut provided = IndexMap::new();
        for (name, expr) in &variables {
            match bind_string(&env, expr) {
                Ok(value) => {
                    provided.insert(name.clone(), value);
                }
                Err(e) => {
                    return self.fail_step(step_id, ErrorKind::Bind, e.to_string()).await
                }
            }
        }

        let template = match self.resolve_template(&template_ref) {
            Ok(template) => template,
            Err(message) => {
                return self
                    .fail_step(step_id, ErrorKind::Dispatch, message)
                    .await
            }
        };
        let scope = match resolve_variables(&template, provided) {
            Ok(scope) => scope,
            Err(e) => return self.fail_step(step_id, ErrorKind::Bind, e.to_string()).await,
        };

        let children = expand_exec::plan_template(&template, step_id, scope);
        self.install_children(step_id, children)
    }

    async fn dispatch_foreach(
        &mut self,
        step_id: &StepId,
        items_expr: String,
        item_var: String,
        index_var: String,
        template_ref: String,
    ) -> Result<(), EngineError> {
        let env = self.env_for(step_id);
        let items = match bind_string(&env, &items_expr) {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                return self
                    .fail_step(
                        step_id,
                        ErrorKind::Bind,
                        format!(
                            "foreach items must bind to a sequence, got {}",
                            other.type_name()
                        ),
                    )
                    .await
            }
            Err(e) => return self.fail_step(step_id, ErrorKind::Bind, e.to_string()).await,
        };

        let template = match self.resolve_template(&template_ref) {
            Ok(template) => template,
            Err(message) => {
                return self
                    .fail_step(step_id, ErrorKind::Dispatch, message)
                    .await
            }
        };

        let base_scope = self
            .run
            .get_step(step_id.as_str())
            .map(|s| s.scope.clone())
            .unwrap_or_default();
        let mut children = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            children.extend(expand_exec::plan_iteration(
                &template, step_id, &base_scope, &item_var, item, &index_var, index,
            ));
        }
        self.install_children(step_id, children)
    }

    async fn dispatch_branch(
        &mut self,
        step_id: &StepId,
        condition: String,
    ) -> Result<(), EngineError> {
        let env = self.env_for(step_id);
        let bound = match bind_to_string(&env, &condition) {
            Ok(bound) => bound,
            Err(e) => return self.fail_step(step_id, ErrorKind::Bind, e.to_string()).await,
        };
        if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
            if let StepPayload::Branch {
                condition: stored, ..
            } = &mut step.payload
            {
                *stored = bound.clone();
            }
        }
        let timeout = self.step_timeout(step_id);
        self.mark_running(step_id)?;

        let tx = self.result_tx.clone();
        let id = step_id.clone();
        let child_env = self.child_env();
        let cwd = working_dir();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let outcome = shell_exec::run_condition(bound, cwd, child_env, timeout, cancel).await;
            let _ = tx.send(StepResult::new(id, outcome)).await;
        });
        Ok(())
    }

    /// Insert expansion children and persist children + links in one write.
    ///
    /// An empty expansion completes the parent immediately.
    fn install_children(
        &mut self,
        parent_id: &StepId,
        children: Vec<Step>,
    ) -> Result<(), EngineError> {
        let child_ids: Vec<StepId> = children.iter().map(|c| c.id.clone()).collect();
        if let Some(parent) = self.run.get_step_mut(parent_id.as_str()) {
            parent.expanded_into = child_ids;
            parent.status = if children.is_empty() {
                StepStatus::Done
            } else {
                StepStatus::Running
            };
        }
        for child in children {
            self.run.insert_step(child);
        }
        self.persist()?;
        let empty_expansion = self
            .run
            .get_step(parent_id.as_str())
            .map(|p| p.status == StepStatus::Done)
            .unwrap_or(false);
        if empty_expansion {
            self.cascade_completion(parent_id)?;
        }
        Ok(())
    }

    // === Result processing ===

    async fn process_result(&mut self, result: StepResult) -> Result<(), EngineError> {
        let StepResult { step_id, outcome } = result;
        let Some(step) = self.run.get_step(step_id.as_str()) else {
            // Deleted by recovery or a re-expansion; nothing to apply
            return Ok(());
        };
        if !step.status.is_in_flight() {
            tracing::debug!(step = %step_id, "ignoring stale executor result");
            return Ok(());
        }

        match outcome {
            ExecOutcome::Success { outputs } => self.complete_step(&step_id, outputs).await,
            ExecOutcome::Error { kind, message } => {
                if let Some(entry) = self.waits.remove(step_id.as_str()) {
                    entry.wait_cancel.cancel();
                }
                self.fail_step(&step_id, kind, message).await
            }
            ExecOutcome::Suspended => Ok(()),
            ExecOutcome::AgentOutput { outputs } => self.handle_agent_output(&step_id, outputs).await,
            ExecOutcome::AgentTimeout => self.handle_agent_timeout(&step_id).await,
            ExecOutcome::AgentCrashed => self.handle_agent_crashed(&step_id).await,
            ExecOutcome::Condition { taken } => self.handle_condition(&step_id, taken).await,
        }
    }

    /// Apply outputs and executor-kind bookkeeping, then mark done.
    async fn complete_step(
        &mut self,
        step_id: &StepId,
        outputs: IndexMap<String, Value>,
    ) -> Result<(), EngineError> {
        let payload = self
            .run
            .get_step(step_id.as_str())
            .map(|s| s.payload.clone());

        let mut stopped_event = None;
        match payload {
            Some(StepPayload::Spawn { agent, adapter, .. }) => {
                let agent_id = AgentId::new(agent.clone());
                let session_name = self.run.session_name(&agent_id);
                self.run.agents.insert(
                    agent,
                    AgentInfo {
                        session_name,
                        adapter,
                        status: AgentStatus::Active,
                        current_step: None,
                    },
                );
            }
            Some(StepPayload::Kill { agent, .. }) => {
                if let Some(info) = self.run.get_agent_mut(&agent) {
                    info.status = AgentStatus::Stopped;
                    info.current_step = None;
                }
                stopped_event = Some(EngineEvent::agent_stopped(
                    &AgentId::new(agent),
                    StopReason::Killed,
                ));
            }
            _ => {}
        }

        if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
            step.outputs = outputs;
            step.status = StepStatus::Done;
        }
        tracing::info!(step = %step_id, "done");
        // Transition persisted before anyone can observe the event
        self.persist()?;
        if let Some(event) = stopped_event {
            self.router.emit(&event);
        }
        self.cascade_completion(step_id)
    }

    /// Agent reported outputs: validate, then finish or re-prompt.
    async fn handle_agent_output(
        &mut self,
        step_id: &StepId,
        outputs: IndexMap<String, Value>,
    ) -> Result<(), EngineError> {
        let Some(entry) = self.waits.remove(step_id.as_str()) else {
            return Ok(());
        };
        entry.wait_cancel.cancel();

        // The window between "agent reported done" and "validated & persisted"
        if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
            step.status = StepStatus::Completing;
        }
        self.persist()?;

        let schema = match self.run.get_step(step_id.as_str()).map(|s| &s.payload) {
            Some(StepPayload::Agent { outputs, .. }) => outputs.clone(),
            _ => IndexMap::new(),
        };

        match validate_outputs(&schema, &outputs) {
            Ok(()) => {
                if let Some(info) = self.run.get_agent_mut(entry.agent_id.as_str()) {
                    info.current_step = None;
                }
                self.complete_step(step_id, outputs).await
            }
            Err(failure) => {
                let attempts = {
                    let Some(step) = self.run.get_step_mut(step_id.as_str()) else {
                        return Ok(());
                    };
                    step.attempts += 1;
                    step.attempts
                };

                if attempts > self.config.max_validation_attempts {
                    if let Some(info) = self.run.get_agent_mut(entry.agent_id.as_str()) {
                        info.current_step = None;
                    }
                    return self
                        .fail_step(step_id, ErrorKind::Validation, failure.to_string())
                        .await;
                }

                let remaining = entry
                    .deadline
                    .checked_duration_since(tokio::time::Instant::now());
                let Some(remaining) = remaining.filter(|d| !d.is_zero()) else {
                    // Step timer ran out across retries
                    self.waits.insert(
                        step_id.to_string(),
                        entry,
                    );
                    return self.handle_agent_timeout(step_id).await;
                };

                tracing::info!(
                    step = %step_id,
                    attempts,
                    "output validation failed, re-prompting"
                );
                if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
                    step.status = StepStatus::Running;
                }
                self.persist()?;

                // Same deadline: the timer runs across validation retries
                self.register_wait_with_deadline(
                    step_id,
                    &entry.agent_id,
                    entry.deadline,
                    remaining,
                    entry.prompt.clone(),
                );

                let reprompt = format!("{}{}", entry.prompt, failure.as_reprompt());
                let tx = self.result_tx.clone();
                let id = step_id.clone();
                let sessions = Arc::clone(&self.sessions);
                let agent_id = entry.agent_id.clone();
                tokio::spawn(async move {
                    let outcome = agent_exec::inject_prompt(sessions, agent_id, reprompt).await;
                    let _ = tx.send(StepResult::new(id, outcome)).await;
                });
                Ok(())
            }
        }
    }

    /// Step timer fired: stop the agent, fail the step with `kind=timeout`.
    async fn handle_agent_timeout(&mut self, step_id: &StepId) -> Result<(), EngineError> {
        let Some(entry) = self.waits.remove(step_id.as_str()) else {
            return Ok(());
        };
        entry.wait_cancel.cancel();

        if let Some(info) = self.run.get_agent_mut(entry.agent_id.as_str()) {
            info.status = AgentStatus::Stopped;
            info.current_step = None;
        }
        // Timeout protocol: adapter stop keys, grace, then kill
        let sessions = Arc::clone(&self.sessions);
        let agent_id = entry.agent_id.clone();
        tokio::spawn(async move {
            if let Err(e) = sessions.stop(&agent_id, true).await {
                tracing::warn!(agent = %agent_id, error = %e, "stop after timeout failed");
            }
        });
        self.router
            .emit(&EngineEvent::agent_stopped(&entry.agent_id, StopReason::Killed));

        self.fail_step(
            step_id,
            ErrorKind::Timeout,
            format!("agent step timed out (agent '{}')", entry.agent_id),
        )
        .await
    }

    /// Session vanished under a running agent step.
    async fn handle_agent_crashed(&mut self, step_id: &StepId) -> Result<(), EngineError> {
        let Some(entry) = self.waits.remove(step_id.as_str()) else {
            return Ok(());
        };
        entry.wait_cancel.cancel();

        if let Some(info) = self.run.get_agent_mut(entry.agent_id.as_str()) {
            info.status = AgentStatus::Stopped;
            info.current_step = None;
        }
        self.router.emit(&EngineEvent::agent_stopped(
            &entry.agent_id,
            StopReason::Crashed,
        ));

        self.fail_step(
            step_id,
            ErrorKind::AgentCrashed,
            format!("agent '{}' session vanished", entry.agent_id),
        )
        .await
    }

    /// Branch condition resolved: expand the chosen arm.
    async fn handle_condition(
        &mut self,
        step_id: &StepId,
        taken: ConditionOutcome,
    ) -> Result<(), EngineError> {
        let payload = self
            .run
            .get_step(step_id.as_str())
            .map(|s| s.payload.clone());
        let Some(StepPayload::Branch {
            on_true,
            on_false,
            on_timeout,
            ..
        }) = payload
        else {
            return Ok(());
        };

        let arm = match taken {
            ConditionOutcome::True => on_true,
            ConditionOutcome::False => on_false,
            ConditionOutcome::TimedOut => match on_timeout {
                Some(arm) => Some(arm),
                None => {
                    return self
                        .fail_step(
                            step_id,
                            ErrorKind::Timeout,
                            "branch condition exceeded step timeout".to_string(),
                        )
                        .await
                }
            },
        };
        tracing::info!(step = %step_id, taken = ?taken, "branch resolved");

        let scope = self
            .run
            .get_step(step_id.as_str())
            .map(|s| s.scope.clone())
            .unwrap_or_default();

        let children = if expand_exec::arm_is_empty(arm.as_ref()) {
            // "no children, immediately done"
            Vec::new()
        } else {
            match &arm {
                None => Vec::new(),
                Some(BranchArm::Steps(defs)) => {
                    expand_exec::plan_inline_arm(defs, step_id, scope)
                }
                Some(BranchArm::Template(reference)) => {
                    let template = match self.resolve_template(reference) {
                        Ok(template) => template,
                        Err(message) => {
                            return self
                                .fail_step(step_id, ErrorKind::Dispatch, message)
                                .await
                        }
                    };
                    let scope = match resolve_variables(&template, scope) {
                        Ok(scope) => scope,
                        Err(e) => {
                            return self
                                .fail_step(step_id, ErrorKind::Bind, e.to_string())
                                .await
                        }
                    };
                    expand_exec::plan_template(&template, step_id, scope)
                }
            }
        };

        self.install_children(step_id, children)
    }

    // === Failure policy ===

    async fn fail_step(
        &mut self,
        step_id: &StepId,
        kind: ErrorKind,
        message: String,
    ) -> Result<(), EngineError> {
        tracing::warn!(step = %step_id, kind = %kind, message = %message, "step failed");
        let on_error = {
            let Some(step) = self.run.get_step_mut(step_id.as_str()) else {
                return Ok(());
            };
            step.fail(kind, message.clone());
            step.on_error.clone()
        };

        match on_error {
            OnError::Fail => {
                self.halted = true;
            }
            OnError::Continue => {}
            OnError::Recover(reference) => {
                self.expand_recovery(step_id, &reference, kind, &message)?;
            }
        }
        self.persist()?;
        self.cascade_completion(step_id)
    }

    /// Expand a recovery template under a failed step, with `_failed_step`
    /// describing the failure in scope.
    fn expand_recovery(
        &mut self,
        step_id: &StepId,
        reference: &str,
        kind: ErrorKind,
        message: &str,
    ) -> Result<(), EngineError> {
        let template = match self.resolve_template(reference) {
            Ok(template) => template,
            Err(resolve_message) => {
                tracing::error!(
                    step = %step_id,
                    reference,
                    error = %resolve_message,
                    "recovery template unresolvable, treating as continue"
                );
                return Ok(());
            }
        };

        let mut scope = self
            .run
            .get_step(step_id.as_str())
            .map(|s| s.scope.clone())
            .unwrap_or_default();
        scope.insert(
            "_failed_step".to_string(),
            Value::Object(
                [
                    ("id".to_string(), Value::from(step_id.as_str())),
                    ("kind".to_string(), Value::from(kind.to_string())),
                    ("message".to_string(), Value::from(message)),
                ]
                .into_iter()
                .collect(),
            ),
        );

        let children = expand_exec::plan_template(&template, step_id, scope);
        let child_ids: Vec<StepId> = children.iter().map(|c| c.id.clone()).collect();
        if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
            step.expanded_into = child_ids;
        }
        for child in children {
            self.run.insert_step(child);
        }
        Ok(())
    }

    // === Expansion completion & run termination ===

    /// Walk up the expansion chain finishing parents whose subtrees are done.
    fn cascade_completion(&mut self, step_id: &StepId) -> Result<(), EngineError> {
        let mut current = step_id.clone();
        while let Some(parent_id) = self
            .run
            .get_step(current.as_str())
            .and_then(|s| s.expanded_from.clone())
        {
            let Some(parent) = self.run.get_step(parent_id.as_str()) else {
                break;
            };
            let status = parent.status;
            let children: Vec<StepId> = parent.expanded_into.clone();
            if children.is_empty()
                || !children.iter().all(|c| self.subtree_terminal(c.as_str()))
            {
                break;
            }

            match status {
                StepStatus::Running => {
                    let all_permitted =
                        children.iter().all(|c| self.child_permitted(c.as_str()));
                    if all_permitted {
                        if let Some(parent) = self.run.get_step_mut(parent_id.as_str()) {
                            parent.status = StepStatus::Done;
                        }
                        tracing::info!(step = %parent_id, "expansion complete");
                        self.persist()?;
                    } else {
                        // Parent inherits the failure; its own on_error applies
                        let on_error = {
                            let Some(parent) = self.run.get_step_mut(parent_id.as_str())
                            else {
                                break;
                            };
                            parent.fail(ErrorKind::Internal, "one or more children failed");
                            parent.on_error.clone()
                        };
                        if matches!(on_error, OnError::Fail) {
                            self.halted = true;
                        }
                        self.persist()?;
                    }
                }
                // A failed step whose recovery children just drained: its
                // own status is settled, but completion still flows upward
                // so enclosing expansions can finish.
                StepStatus::Failed => {}
                _ => break,
            }
            current = parent_id;
        }
        Ok(())
    }

    /// A step and everything it expanded into are terminal.
    fn subtree_terminal(&self, step_id: &str) -> bool {
        let Some(step) = self.run.get_step(step_id) else {
            return true;
        };
        step.status.is_terminal()
            && step
                .expanded_into
                .iter()
                .all(|c| self.subtree_terminal(c.as_str()))
    }

    /// Done, skipped, or failed under a policy that permits continuing.
    fn child_permitted(&self, step_id: &str) -> bool {
        let Some(step) = self.run.get_step(step_id) else {
            return true;
        };
        match step.status {
            StepStatus::Done | StepStatus::Skipped => true,
            StepStatus::Failed => {
                matches!(step.on_error, OnError::Continue | OnError::Recover(_))
            }
            _ => false,
        }
    }

    fn finished(&self) -> bool {
        if self.run.has_in_flight_steps() {
            return false;
        }
        if self.halted {
            return true;
        }
        if self.run.all_steps_terminal() {
            return true;
        }
        // No in-flight work and nothing dispatchable on a non-halted run
        // means unsatisfiable needs; surface instead of spinning.
        self.dispatchable().is_empty()
    }

    async fn finish(&mut self) -> Result<RunStatus, EngineError> {
        let failed = self.halted
            || self
                .run
                .steps
                .values()
                .any(|s| s.status == StepStatus::Failed && matches!(s.on_error, OnError::Fail));
        let stuck = !self.halted && !self.run.all_steps_terminal();
        if stuck {
            tracing::error!("run has unsatisfiable pending steps; failing");
        }

        self.run.status = if failed || stuck {
            RunStatus::Failed
        } else {
            RunStatus::Done
        };
        self.run.completed_at = Some(chrono::Utc::now());
        self.persist()?;
        self.cancel.cancel();
        let elapsed_ms = self
            .clock
            .epoch_ms()
            .saturating_sub(self.run.started_at.timestamp_millis() as u64);
        tracing::info!(
            run = %self.run.id,
            status = %self.run.status,
            elapsed_ms,
            "run finished"
        );
        Ok(self.run.status)
    }

    async fn finish_cancelled(&mut self) -> Result<RunStatus, EngineError> {
        tracing::warn!(run = %self.run.id, "cancelling run");
        for entry in self.waits.values() {
            entry.wait_cancel.cancel();
        }
        self.waits.clear();

        // Graceful-stop every active agent per its adapter
        let agents: Vec<AgentId> = self
            .run
            .agents
            .iter()
            .filter(|(_, info)| info.status == AgentStatus::Active)
            .map(|(id, _)| AgentId::new(id.clone()))
            .collect();
        for agent_id in agents {
            if let Err(e) = self.sessions.stop(&agent_id, true).await {
                tracing::warn!(agent = %agent_id, error = %e, "stop during cancel failed");
            }
            if let Some(info) = self.run.get_agent_mut(agent_id.as_str()) {
                info.status = AgentStatus::Stopped;
            }
        }

        self.run.status = RunStatus::Cancelled;
        self.run.completed_at = Some(chrono::Utc::now());
        self.persist()?;
        Ok(RunStatus::Cancelled)
    }

    // === Wait-map management ===

    fn register_wait(
        &mut self,
        step_id: &StepId,
        agent_id: &AgentId,
        timeout: Duration,
        prompt: String,
    ) {
        let deadline = tokio::time::Instant::now() + timeout;
        self.register_wait_with_deadline(step_id, agent_id, deadline, timeout, prompt);
    }

    fn register_wait_with_deadline(
        &mut self,
        step_id: &StepId,
        agent_id: &AgentId,
        deadline: tokio::time::Instant,
        remaining: Duration,
        prompt: String,
    ) {
        let wait_cancel = self.cancel.child_token();
        let registration = self.router.register(
            EVENT_AGENT_OUTPUT,
            Predicate::field("agent_id", agent_id.as_str()),
        );

        let tx = self.result_tx.clone();
        let id = step_id.clone();
        let task_cancel = wait_cancel.clone();
        tokio::spawn(async move {
            match registration.wait(remaining, &task_cancel).await {
                Outcome::Matched(payload) => {
                    let outputs = payload
                        .get("outputs")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    let _ = tx
                        .send(StepResult::new(id, ExecOutcome::AgentOutput { outputs }))
                        .await;
                }
                Outcome::TimedOut => {
                    let _ = tx.send(StepResult::new(id, ExecOutcome::AgentTimeout)).await;
                }
                Outcome::Cancelled => {}
            }
        });

        self.waits.insert(
            step_id.to_string(),
            WaitEntry {
                agent_id: agent_id.clone(),
                deadline,
                prompt,
                wait_cancel,
            },
        );
    }

    /// After resume: re-enter the suspended state for agent steps that were
    /// left running against still-alive sessions. The timer restarts with
    /// the step's full budget (deadlines don't survive a crash).
    fn rehydrate_waits(&mut self) {
        let suspended: Vec<(StepId, String, String)> = self
            .run
            .steps
            .values()
            .filter(|s| s.status == StepStatus::Running)
            .filter_map(|s| match &s.payload {
                StepPayload::Agent { agent, prompt, .. } => {
                    Some((s.id.clone(), agent.clone(), prompt.clone()))
                }
                _ => None,
            })
            .collect();

        for (step_id, agent, prompt) in suspended {
            let timeout = self
                .step_timeout(&step_id)
                .unwrap_or(self.config.default_agent_timeout);
            tracing::info!(step = %step_id, agent = %agent, "re-registering agent waiter");
            self.register_wait(&step_id, &AgentId::new(agent), timeout, prompt);
        }
    }

    /// Poll liveness for agents with suspended steps; a dead session fails
    /// the step with `kind=agent_crashed`.
    async fn check_agent_liveness(&mut self) -> Result<(), EngineError> {
        let entries: Vec<(String, AgentId)> = self
            .waits
            .iter()
            .map(|(step, entry)| (step.clone(), entry.agent_id.clone()))
            .collect();
        for (step_id, agent_id) in entries {
            if !self.sessions.is_alive(&agent_id).await {
                self.process_result(StepResult::new(
                    StepId::new(step_id),
                    ExecOutcome::AgentCrashed,
                ))
                .await?;
            }
        }
        Ok(())
    }

    // === Helpers ===

    /// The step's bound environment: run variables, scope overlay, and the
    /// `steps.<local-id>` outputs of done siblings in the same id namespace
    /// (everything before the last dot — foreach iterations each form their
    /// own namespace even though they all hang off the one foreach step).
    fn env_for(&self, step_id: &StepId) -> Env {
        let mut env = Env::new(self.run.variables.clone());
        let Some(step) = self.run.get_step(step_id.as_str()) else {
            return env;
        };
        env.overlay(&step.scope);

        let (namespace, _) = split_step_id(step.id.as_str());
        let mut siblings = IndexMap::new();
        for other in self.run.steps.values() {
            if other.status != StepStatus::Done {
                continue;
            }
            let (other_namespace, local) = split_step_id(other.id.as_str());
            if other_namespace == namespace {
                siblings.insert(local.to_string(), Value::Object(other.outputs.clone()));
            }
        }
        env.insert("steps", Value::Object(siblings));
        env
    }

    /// Resolve a template reference against the run's workflow file.
    fn resolve_template(&self, reference: &str) -> Result<Template, String> {
        let parsed = TemplateRef::parse(reference).map_err(|e| e.to_string())?;
        let resolved = parsed
            .resolve(&self.workflow, &self.config.workflow_dir)
            .map_err(|e| e.to_string())?;
        Ok(resolved.template().clone())
    }

    fn step_timeout(&self, step_id: &StepId) -> Option<Duration> {
        self.run
            .get_step(step_id.as_str())
            .and_then(|s| s.timeout.as_deref())
            .and_then(|raw| meow_core::parse_duration(raw).ok())
    }

    fn mark_running(&mut self, step_id: &StepId) -> Result<(), EngineError> {
        if let Some(step) = self.run.get_step_mut(step_id.as_str()) {
            step.status = StepStatus::Running;
        }
        self.persist()
    }

    /// Environment for child shell processes (`meow event` needs the socket).
    fn child_env(&self) -> Vec<(String, String)> {
        engine_env(&self.run.id, &self.store.socket_path(&self.run.id))
    }

    fn persist(&mut self) -> Result<(), EngineError> {
        if let Err(e) = self.store.save(&self.run) {
            // Fatal: tear down with a best-effort failure record
            tracing::error!(error = %e, "state store write failed");
            self.run.status = RunStatus::Failed;
            let _ = self.store.save(&self.run);
            return Err(EngineError::Store(e));
        }
        Ok(())
    }
}

/// Reload the workflow file a run was started from.
fn load_origin_workflow(run: &Run) -> Result<WorkflowFile, EngineError> {
    let content = std::fs::read_to_string(&run.template).map_err(|e| {
        EngineError::Workflow(format!(
            "cannot reload workflow '{}': {}",
            run.template, e
        ))
    })?;
    meow_workflow::parse_workflow(&content).map_err(|e| EngineError::Workflow(e.to_string()))
}

fn working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Split a step id into (namespace, local id) on the last dot.
/// Root steps have an empty namespace.
fn split_step_id(id: &str) -> (&str, &str) {
    id.rsplit_once('.').unwrap_or(("", id))
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
