// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level scenarios: DAG order, parallelism, expansion, validation
//! retry, timeouts, failure policy, and the agent event flow, driven through
//! a fake session backend.

use super::*;
use indexmap::IndexMap;
use meow_adapters::FakeSessionBackend;
use meow_core::{SystemClock, Value};
use std::path::Path;
use std::time::Duration;

fn test_config(root: &Path) -> Config {
    Config {
        runs_dir: root.join("runs"),
        workflow_dir: root.join("workflows"),
        adapter_dir: root.join("adapters"),
        logs_dir: root.join("logs"),
        tmux_socket: None,
        poll_interval: Duration::from_millis(10),
        default_agent_timeout: Duration::from_secs(30),
        max_validation_attempts: 5,
    }
}

struct Harness {
    dir: tempfile::TempDir,
    backend: FakeSessionBackend,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            backend: FakeSessionBackend::new(),
        }
    }

    fn engine(&self, toml: &str) -> Engine<FakeSessionBackend, SystemClock> {
        self.engine_with_vars(toml, IndexMap::new())
    }

    fn engine_with_vars(
        &self,
        toml: &str,
        provided: IndexMap<String, Value>,
    ) -> Engine<FakeSessionBackend, SystemClock> {
        let workflow = meow_workflow::parse_workflow(toml).unwrap();
        let origin = self.dir.path().join("wf.toml");
        std::fs::write(&origin, toml).unwrap();
        Engine::create(
            EngineDeps {
                backend: self.backend.clone(),
                clock: SystemClock,
                config: test_config(self.dir.path()),
            },
            workflow,
            origin.to_string_lossy().to_string(),
            provided,
        )
        .unwrap()
    }

    fn store(&self) -> meow_storage::RunStore {
        meow_storage::RunStore::new(self.dir.path().join("runs"))
    }

    fn order_file(&self) -> std::path::PathBuf {
        self.dir.path().join("order.txt")
    }

    fn order(&self) -> Vec<String> {
        std::fs::read_to_string(self.order_file())
            .unwrap_or_default()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }
}

async fn run_engine(
    mut engine: Engine<FakeSessionBackend, SystemClock>,
) -> (RunStatus, RunId) {
    let run_id = engine.run_id().clone();
    let status = engine.run_to_completion().await.unwrap();
    (status, run_id)
}

/// Wait until the fake backend has recorded `count` injections for session.
async fn wait_for_injections(backend: &FakeSessionBackend, session: &str, count: usize) {
    for _ in 0..500 {
        if backend.injected_text(session).len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never saw {} injections into {}", count, session);
}

fn agent_outputs(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn diamond_respects_dag_order() {
    let harness = Harness::new();
    let order = harness.order_file();
    let toml = format!(
        r#"
[main]
name = "diamond"

[[main.steps]]
id = "a"
executor = "shell"
command = "echo a >> {order}"

[[main.steps]]
id = "b"
executor = "shell"
command = "echo b >> {order}"
needs = ["a"]

[[main.steps]]
id = "c"
executor = "shell"
command = "echo c >> {order}"
needs = ["a"]

[[main.steps]]
id = "d"
executor = "shell"
command = "echo d >> {order}"
needs = ["b", "c"]
"#,
        order = order.display()
    );

    let (status, run_id) = run_engine(harness.engine(&toml)).await;
    assert_eq!(status, RunStatus::Done);

    let order = harness.order();
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "a");
    assert_eq!(order[3], "d");
    // b and c in either order between them
    assert!(order[1..3].contains(&"b".to_string()));
    assert!(order[1..3].contains(&"c".to_string()));

    let run = harness.store().load(&run_id).unwrap();
    assert!(run.all_steps_terminal());
    assert_eq!(run.status, RunStatus::Done);
}

#[tokio::test]
async fn independent_steps_run_in_parallel() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "parallel"

[[main.steps]]
id = "one"
executor = "shell"
command = "sleep 0.3"

[[main.steps]]
id = "two"
executor = "shell"
command = "sleep 0.3"

[[main.steps]]
id = "three"
executor = "shell"
command = "sleep 0.3"

[[main.steps]]
id = "join"
executor = "shell"
command = "true"
needs = ["one", "two", "three"]
"#;

    let started = std::time::Instant::now();
    let (status, _) = run_engine(harness.engine(toml)).await;
    let elapsed = started.elapsed();

    assert_eq!(status, RunStatus::Done);
    assert!(
        elapsed < Duration::from_millis(750),
        "three parallel 300ms sleeps took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn outputs_flow_to_dependents() {
    let harness = Harness::new();
    let out = harness.dir.path().join("result.txt");
    let toml = format!(
        r#"
[main]
name = "flow"

[[main.steps]]
id = "produce"
executor = "shell"
command = "printf '{{\"n\": 41}}'"

[main.steps.outputs.data]
source = "stdout"
type = "json"

[[main.steps]]
id = "consume"
executor = "shell"
command = "echo {{{{steps.produce.data.n}}}} > {out}"
needs = ["produce"]
"#,
        out = out.display()
    );

    let (status, run_id) = run_engine(harness.engine(&toml)).await;
    assert_eq!(status, RunStatus::Done);
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "41");

    // The producer's parsed JSON output persisted as a structure
    let run = harness.store().load(&run_id).unwrap();
    let data = &run.get_step("produce").unwrap().outputs["data"];
    assert_eq!(data.get("n"), Some(&Value::Integer(41)));
}

#[tokio::test]
async fn validation_retry_reprompts_once_then_succeeds() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "retry"

[[main.steps]]
id = "boot"
executor = "spawn"
agent = "worker"
adapter = "simulator"

[[main.steps]]
id = "triage"
executor = "agent"
agent = "worker"
prompt = "Pick the next task"
needs = ["boot"]
timeout = "10s"

[main.steps.outputs.task_id]
required = true
type = "string"
"#;

    let engine = harness.engine(toml);
    let run_id = engine.run_id().clone();
    let session = format!("meow-{}-worker", run_id);
    let router = engine.router().clone();
    let backend = harness.backend.clone();

    let driver = tokio::spawn(async move {
        wait_for_injections(&backend, &session, 1).await;
        router.emit(&EngineEvent::agent_output(
            &AgentId::new("worker"),
            agent_outputs(&[("wrong_key", Value::from("x"))]),
        ));
        wait_for_injections(&backend, &session, 2).await;
        router.emit(&EngineEvent::agent_output(
            &AgentId::new("worker"),
            agent_outputs(&[("task_id", Value::from("PROJ-123"))]),
        ));
    });

    let (status, run_id) = run_engine(engine).await;
    driver.await.unwrap();
    assert_eq!(status, RunStatus::Done);

    let run = harness.store().load(&run_id).unwrap();
    let triage = run.get_step("triage").unwrap();
    assert_eq!(triage.status, StepStatus::Done);
    assert_eq!(triage.outputs["task_id"], Value::from("PROJ-123"));
    // N failures => N+1 injections
    assert_eq!(triage.attempts, 2);
    assert_eq!(
        harness
            .backend
            .injected_text(&format!("meow-{}-worker", run_id))
            .len(),
        2
    );
    // The re-prompt carried the validation error
    let reprompt = &harness.backend.injected_text(&format!("meow-{}-worker", run_id))[1];
    assert!(reprompt.contains("Pick the next task"));
    assert!(reprompt.contains("task_id"));
}

#[tokio::test]
async fn agent_timeout_with_continue_lets_run_finish() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "timeout"

[[main.steps]]
id = "boot"
executor = "spawn"
agent = "worker"
adapter = "simulator"

[[main.steps]]
id = "hang"
executor = "agent"
agent = "worker"
prompt = "never answered"
needs = ["boot"]
timeout = "300ms"
on_error = "continue"

[[main.steps]]
id = "after"
executor = "shell"
command = "true"
needs = ["hang"]
"#;

    let (status, run_id) = run_engine(harness.engine(toml)).await;
    assert_eq!(status, RunStatus::Done);

    let run = harness.store().load(&run_id).unwrap();
    let hang = run.get_step("hang").unwrap();
    assert_eq!(hang.status, StepStatus::Failed);
    assert_eq!(hang.error.as_ref().unwrap().kind, ErrorKind::Timeout);
    assert_eq!(run.get_step("after").unwrap().status, StepStatus::Done);
    assert_eq!(
        run.get_agent("worker").unwrap().status,
        AgentStatus::Stopped
    );
}

#[tokio::test]
async fn fail_policy_halts_dispatch() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "halt"

[[main.steps]]
id = "bad"
executor = "shell"
command = "exit 1"

[[main.steps]]
id = "downstream"
executor = "shell"
command = "true"
needs = ["bad"]
"#;

    let (status, run_id) = run_engine(harness.engine(toml)).await;
    assert_eq!(status, RunStatus::Failed);

    let run = harness.store().load(&run_id).unwrap();
    assert_eq!(run.get_step("bad").unwrap().status, StepStatus::Failed);
    assert_eq!(
        run.get_step("bad").unwrap().error.as_ref().unwrap().kind,
        ErrorKind::Exit
    );
    // Never dispatched
    assert_eq!(
        run.get_step("downstream").unwrap().status,
        StepStatus::Pending
    );
}

#[tokio::test]
async fn continue_policy_satisfies_dependents() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "continue"

[[main.steps]]
id = "flaky"
executor = "shell"
command = "exit 1"
on_error = "continue"

[[main.steps]]
id = "after"
executor = "shell"
command = "true"
needs = ["flaky"]
"#;

    let (status, run_id) = run_engine(harness.engine(toml)).await;
    assert_eq!(status, RunStatus::Done);

    let run = harness.store().load(&run_id).unwrap();
    assert_eq!(run.get_step("flaky").unwrap().status, StepStatus::Failed);
    assert_eq!(run.get_step("after").unwrap().status, StepStatus::Done);
}

#[tokio::test]
async fn recover_policy_expands_recovery_template() {
    let harness = Harness::new();
    let out = harness.dir.path().join("recovered.txt");
    let toml = format!(
        r#"
[main]
name = "recover"

[[main.steps]]
id = "risky"
executor = "shell"
command = "exit 1"
on_error = ".cleanup"

[cleanup]
name = "cleanup"
internal = true

[[cleanup.steps]]
id = "note"
executor = "shell"
command = "echo {{{{_failed_step.kind}}}} > {out}"
"#,
        out = out.display()
    );

    let (status, run_id) = run_engine(harness.engine(&toml)).await;
    assert_eq!(status, RunStatus::Done);
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "exit");

    let run = harness.store().load(&run_id).unwrap();
    let risky = run.get_step("risky").unwrap();
    assert_eq!(risky.status, StepStatus::Failed);
    assert_eq!(risky.expanded_into, vec![StepId::new("risky.note")]);
    assert_eq!(
        run.get_step("risky.note").unwrap().status,
        StepStatus::Done
    );
}

#[tokio::test]
async fn expand_passes_typed_variables_through_layers() {
    let harness = Harness::new();
    let out = harness.dir.path().join("priority.txt");
    let toml = format!(
        r#"
[main]
name = "nested"

[[main.steps]]
id = "outer"
executor = "expand"
template = ".layer1"

[main.steps.variables]
t = "{{{{task}}}}"

[layer1]
name = "layer1"
internal = true

[[layer1.steps]]
id = "inner"
executor = "expand"
template = ".layer2"

[layer1.steps.variables]
t = "{{{{t}}}}"

[layer2]
name = "layer2"
internal = true

[[layer2.steps]]
id = "leaf"
executor = "shell"
command = "echo {{{{t.metadata.priority}}}} > {out}"
"#,
        out = out.display()
    );

    let mut task = IndexMap::new();
    task.insert("name".to_string(), Value::from("critical"));
    task.insert(
        "metadata".to_string(),
        Value::Object(
            [("priority".to_string(), Value::Integer(1))]
                .into_iter()
                .collect(),
        ),
    );
    let mut vars = IndexMap::new();
    vars.insert("task".to_string(), Value::Object(task));

    let engine = harness.engine_with_vars(&toml, vars);
    let (status, run_id) = run_engine(engine).await;
    assert_eq!(status, RunStatus::Done);
    // A mapping passed through two expand layers is still a mapping
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "1");

    let run = harness.store().load(&run_id).unwrap();
    assert_eq!(run.get_step("outer").unwrap().status, StepStatus::Done);
    assert!(run.get_step("outer.inner.leaf").is_some());
}

#[tokio::test]
async fn foreach_expands_per_item() {
    let harness = Harness::new();
    let out_dir = harness.dir.path().join("items");
    std::fs::create_dir_all(&out_dir).unwrap();
    let toml = format!(
        r#"
[main]
name = "each"

[[main.steps]]
id = "fan"
executor = "foreach"
items = "{{{{items}}}}"
template = ".work"

[work]
name = "work"
internal = true

[[work.steps]]
id = "touch"
executor = "shell"
command = "touch {dir}/{{{{item.id}}}}-{{{{index}}}}"
"#,
        dir = out_dir.display()
    );

    let mut vars = IndexMap::new();
    vars.insert(
        "items".to_string(),
        Value::Array(vec![
            Value::Object([("id".to_string(), Value::from("a"))].into_iter().collect()),
            Value::Object([("id".to_string(), Value::from("b"))].into_iter().collect()),
        ]),
    );

    let engine = harness.engine_with_vars(&toml, vars);
    let (status, run_id) = run_engine(engine).await;
    assert_eq!(status, RunStatus::Done);
    assert!(out_dir.join("a-0").exists());
    assert!(out_dir.join("b-1").exists());

    let run = harness.store().load(&run_id).unwrap();
    let fan = run.get_step("fan").unwrap();
    assert_eq!(fan.status, StepStatus::Done);
    assert_eq!(
        fan.expanded_into,
        vec![StepId::new("fan.0.touch"), StepId::new("fan.1.touch")]
    );
    assert_eq!(
        run.get_step("fan.0.touch").unwrap().expanded_from,
        Some(StepId::new("fan"))
    );
}

#[tokio::test]
async fn foreach_iterations_run_their_own_dag() {
    let harness = Harness::new();
    let out = harness.dir.path().join("seen.txt");
    let toml = format!(
        r#"
[main]
name = "each-dag"

[[main.steps]]
id = "fan"
executor = "foreach"
items = "{{{{items}}}}"
template = ".work"

[work]
name = "work"
internal = true

[[work.steps]]
id = "produce"
executor = "shell"
command = "echo {{{{item.id}}}}"

[work.steps.outputs.line]
source = "stdout"

[[work.steps]]
id = "consume"
executor = "shell"
command = "echo {{{{steps.produce.line}}}} >> {out}"
needs = ["produce"]
"#,
        out = out.display()
    );

    let mut vars = IndexMap::new();
    vars.insert(
        "items".to_string(),
        Value::Array(vec![
            Value::Object([("id".to_string(), Value::from("a"))].into_iter().collect()),
            Value::Object([("id".to_string(), Value::from("b"))].into_iter().collect()),
        ]),
    );

    let engine = harness.engine_with_vars(&toml, vars);
    let (status, run_id) = run_engine(engine).await;
    assert_eq!(status, RunStatus::Done);

    let mut lines: Vec<String> = std::fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    lines.sort();
    assert_eq!(lines, vec!["a", "b"]);

    let run = harness.store().load(&run_id).unwrap();
    let fan = run.get_step("fan").unwrap();
    assert_eq!(fan.status, StepStatus::Done);
    // Iteration steps hang directly off the foreach step
    assert_eq!(
        run.get_step("fan.1.consume").unwrap().expanded_from,
        Some(StepId::new("fan"))
    );
}

#[tokio::test]
async fn recover_inside_expand_completes_parent() {
    let harness = Harness::new();
    let out = harness.dir.path().join("recovered.txt");
    let toml = format!(
        r#"
[main]
name = "nested-recover"

[[main.steps]]
id = "outer"
executor = "expand"
template = ".inner"

[inner]
name = "inner"
internal = true

[[inner.steps]]
id = "risky"
executor = "shell"
command = "exit 1"
on_error = ".cleanup"

[cleanup]
name = "cleanup"
internal = true

[[cleanup.steps]]
id = "note"
executor = "shell"
command = "echo {{{{_failed_step.id}}}} > {out}"
"#,
        out = out.display()
    );

    let (status, run_id) = run_engine(harness.engine(&toml)).await;
    assert_eq!(status, RunStatus::Done);
    assert_eq!(
        std::fs::read_to_string(&out).unwrap().trim(),
        "outer.risky"
    );

    let run = harness.store().load(&run_id).unwrap();
    // The failed step stays failed; its recovery ran; the expand finished
    assert_eq!(
        run.get_step("outer.risky").unwrap().status,
        StepStatus::Failed
    );
    assert_eq!(
        run.get_step("outer.risky.note").unwrap().status,
        StepStatus::Done
    );
    assert_eq!(run.get_step("outer").unwrap().status, StepStatus::Done);
}

#[tokio::test]
async fn branch_takes_the_false_arm() {
    let harness = Harness::new();
    let out = harness.dir.path().join("arm.txt");
    let toml = format!(
        r#"
[main]
name = "branch"

[[main.steps]]
id = "check"
executor = "branch"
condition = "false"

[[main.steps.on_true]]
id = "yes"
executor = "shell"
command = "echo yes > {out}"

[[main.steps.on_false]]
id = "no"
executor = "shell"
command = "echo no > {out}"
"#,
        out = out.display()
    );

    let (status, run_id) = run_engine(harness.engine(&toml)).await;
    assert_eq!(status, RunStatus::Done);
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "no");

    let run = harness.store().load(&run_id).unwrap();
    assert_eq!(
        run.get_step("check").unwrap().expanded_into,
        vec![StepId::new("check.no")]
    );
    assert!(run.get_step("check.yes").is_none());
}

#[tokio::test]
async fn branch_empty_arm_is_immediately_done() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "branch"

[[main.steps]]
id = "check"
executor = "branch"
condition = "true"

[[main.steps.on_false]]
id = "unused"
executor = "shell"
command = "true"
"#;

    let (status, run_id) = run_engine(harness.engine(toml)).await;
    assert_eq!(status, RunStatus::Done);

    let run = harness.store().load(&run_id).unwrap();
    let check = run.get_step("check").unwrap();
    assert_eq!(check.status, StepStatus::Done);
    assert!(check.expanded_into.is_empty());
}

#[tokio::test]
async fn ralph_wiggum_monitor_pattern() {
    let harness = Harness::new();
    let out = harness.dir.path().join("monitored.txt");
    let toml = format!(
        r#"
[main]
name = "ralph"

[[main.steps]]
id = "boot"
executor = "spawn"
agent = "worker"
adapter = "simulator"

[[main.steps]]
id = "monitor"
executor = "branch"
condition = "sleep 0.2"
needs = ["boot"]

[[main.steps.on_true]]
id = "note"
executor = "shell"
command = "echo stopped > {out}"

[[main.steps]]
id = "work"
executor = "agent"
agent = "worker"
prompt = "do the work"
needs = ["boot"]
timeout = "10s"

[[main.steps]]
id = "final"
executor = "shell"
command = "true"
needs = ["monitor", "work"]
"#,
        out = out.display()
    );

    let engine = harness.engine(&toml);
    let run_id = engine.run_id().clone();
    let session = format!("meow-{}-worker", run_id);
    let router = engine.router().clone();
    let backend = harness.backend.clone();

    let driver = tokio::spawn(async move {
        wait_for_injections(&backend, &session, 1).await;
        router.emit(&EngineEvent::agent_output(
            &AgentId::new("worker"),
            IndexMap::new(),
        ));
    });

    let started = std::time::Instant::now();
    let (status, run_id) = run_engine(engine).await;
    driver.await.unwrap();

    assert_eq!(status, RunStatus::Done);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "stopped");

    let run = harness.store().load(&run_id).unwrap();
    assert_eq!(run.get_step("monitor.note").unwrap().status, StepStatus::Done);
    assert_eq!(run.get_step("final").unwrap().status, StepStatus::Done);
}

#[tokio::test]
async fn spawn_and_kill_track_agent_lifecycle() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "lifecycle"

[[main.steps]]
id = "boot"
executor = "spawn"
agent = "worker"
adapter = "simulator"

[[main.steps]]
id = "shutdown"
executor = "kill"
agent = "worker"
needs = ["boot"]
"#;

    let (status, run_id) = run_engine(harness.engine(toml)).await;
    assert_eq!(status, RunStatus::Done);

    let run = harness.store().load(&run_id).unwrap();
    let info = run.get_agent("worker").unwrap();
    assert_eq!(info.status, AgentStatus::Stopped);
    assert_eq!(info.session_name, format!("meow-{}-worker", run_id));
    assert_eq!(info.adapter, "simulator");
    assert!(!harness.backend.has_session(&info.session_name));
}

#[tokio::test]
async fn dead_session_fails_step_as_agent_crashed() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "crash"

[[main.steps]]
id = "boot"
executor = "spawn"
agent = "worker"
adapter = "simulator"

[[main.steps]]
id = "work"
executor = "agent"
agent = "worker"
prompt = "doomed"
needs = ["boot"]
timeout = "10s"
on_error = "continue"
"#;

    let engine = harness.engine(toml);
    let run_id = engine.run_id().clone();
    let session = format!("meow-{}-worker", run_id);
    let backend = harness.backend.clone();

    let driver = tokio::spawn(async move {
        wait_for_injections(&backend, &session, 1).await;
        backend.set_dead(&session);
    });

    let (status, run_id) = run_engine(engine).await;
    driver.await.unwrap();
    assert_eq!(status, RunStatus::Done);

    let run = harness.store().load(&run_id).unwrap();
    let work = run.get_step("work").unwrap();
    assert_eq!(work.status, StepStatus::Failed);
    assert_eq!(work.error.as_ref().unwrap().kind, ErrorKind::AgentCrashed);
    assert_eq!(
        run.get_agent("worker").unwrap().status,
        AgentStatus::Stopped
    );
}

#[tokio::test]
async fn cancellation_terminates_run() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "cancel"

[[main.steps]]
id = "slow"
executor = "shell"
command = "sleep 30"
"#;

    let engine = harness.engine(toml);
    let run_id = engine.run_id().clone();
    let token = engine.cancellation_token();

    let handle = tokio::spawn(async move {
        let mut engine = engine;
        engine.run_to_completion().await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let status = handle.await.unwrap().unwrap();
    assert_eq!(status, RunStatus::Cancelled);

    let run = harness.store().load(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn missing_required_variable_fails_creation() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "needs-vars"

[main.variables.task]
required = true
type = "object"
"#;
    let workflow = meow_workflow::parse_workflow(toml).unwrap();
    let result = Engine::create(
        EngineDeps {
            backend: harness.backend.clone(),
            clock: SystemClock,
            config: test_config(harness.dir.path()),
        },
        workflow,
        "inline",
        IndexMap::new(),
    );
    assert!(matches!(result, Err(EngineError::Vars(_))));
}

#[tokio::test]
async fn dispatch_error_for_agent_step_without_agent() {
    let harness = Harness::new();
    let toml = r#"
[main]
name = "no-agent"

[[main.steps]]
id = "work"
executor = "agent"
agent = "ghost"
prompt = "hello?"
on_error = "continue"
"#;

    let (status, run_id) = run_engine(harness.engine(toml)).await;
    assert_eq!(status, RunStatus::Done);

    let run = harness.store().load(&run_id).unwrap();
    let work = run.get_step("work").unwrap();
    assert_eq!(work.status, StepStatus::Failed);
    assert_eq!(work.error.as_ref().unwrap().kind, ErrorKind::Dispatch);
}
