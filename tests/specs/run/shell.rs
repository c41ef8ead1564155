//! Shell workflow execution: dependency order, outputs, failure policy.

use crate::prelude::{run_id_from, MeowHome};

#[test]
fn diamond_runs_in_dependency_order() {
    let home = MeowHome::new();
    let order = home.path().join("order.txt");
    home.workflow(
        "diamond",
        &format!(
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
        ),
    );

    let assert = home.meow().args(["run", "diamond"]).assert().success();
    let run_id = run_id_from(assert.get_output());
    assert!(!run_id.is_empty(), "run id expected on stdout");

    let lines: Vec<String> = std::fs::read_to_string(&order)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    assert_eq!(lines[0], "a");
    assert_eq!(lines[3], "d");

    let doc = home.run_doc(&run_id);
    assert_eq!(doc["status"], "done");
    assert_eq!(doc["steps"]["d"]["status"], "done");
}

#[test]
fn failing_step_fails_the_run() {
    let home = MeowHome::new();
    home.workflow(
        "broken",
        r#"
[main]
name = "broken"

[[main.steps]]
id = "bad"
executor = "shell"
command = "exit 7"

[[main.steps]]
id = "never"
executor = "shell"
command = "true"
needs = ["bad"]
"#,
    );

    let assert = home.meow().args(["run", "broken"]).assert().failure();
    let output = assert.get_output();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    assert!(stderr.contains("workflow failed"), "stderr: {}", stderr);

    let run_id = run_id_from(output);
    let doc = home.run_doc(&run_id);
    assert_eq!(doc["status"], "failed");
    assert_eq!(doc["steps"]["bad"]["status"], "failed");
    assert_eq!(doc["steps"]["bad"]["error"]["kind"], "exit");
    // Dependents of the failed step were never dispatched
    assert_eq!(doc["steps"]["never"]["status"], "pending");
}

#[test]
fn captured_outputs_reach_dependents() {
    let home = MeowHome::new();
    let out = home.path().join("final.txt");
    home.workflow(
        "pipeline",
        &format!(
            r#"
[main]
name = "pipeline"

[[main.steps]]
id = "version"
executor = "shell"
command = "echo 1.2.3"

[main.steps.outputs.v]
source = "stdout"

[[main.steps]]
id = "report"
executor = "shell"
command = "echo version={{{{steps.version.v}}}} > {out}"
needs = ["version"]
"#,
            out = out.display()
        ),
    );

    home.meow().args(["run", "pipeline"]).assert().success();
    assert_eq!(
        std::fs::read_to_string(&out).unwrap().trim(),
        "version=1.2.3"
    );
}

#[test]
fn continue_policy_keeps_run_alive() {
    let home = MeowHome::new();
    home.workflow(
        "tolerant",
        r#"
[main]
name = "tolerant"

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
"#,
    );

    let assert = home.meow().args(["run", "tolerant"]).assert().success();
    let doc = home.run_doc(&run_id_from(assert.get_output()));
    assert_eq!(doc["status"], "done");
    assert_eq!(doc["steps"]["flaky"]["status"], "failed");
    assert_eq!(doc["steps"]["after"]["status"], "done");
}

#[test]
fn foreach_expansion_from_cli_variables() {
    let home = MeowHome::new();
    let dir = home.path().join("hits");
    std::fs::create_dir_all(&dir).unwrap();
    home.workflow(
        "fanout",
        &format!(
            r#"
[main]
name = "fanout"

[main.variables.items]
required = true
type = "array"

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
command = "touch {dir}/{{{{item.id}}}}"
"#,
            dir = dir.display()
        ),
    );

    home.meow()
        .args([
            "run",
            "fanout",
            "--var",
            r#"items=[{"id": "a"}, {"id": "b"}]"#,
        ])
        .assert()
        .success();

    assert!(dir.join("a").exists());
    assert!(dir.join("b").exists());
}
