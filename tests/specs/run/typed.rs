//! Typed round-trip: structured variables survive persistence and bind by
//! path, integers staying integers.

use crate::prelude::{run_id_from, MeowHome};

#[test]
fn typed_variables_roundtrip_through_the_run_document() {
    let home = MeowHome::new();
    let out = home.path().join("priority.txt");
    home.workflow(
        "typed",
        &format!(
            r#"
[main]
name = "typed"

[main.variables.task]
required = true
type = "object"

[main.variables.items]
required = true
type = "array"

[[main.steps]]
id = "use"
executor = "shell"
command = "echo {{{{task.metadata.priority}}}} > {out}"
"#,
            out = out.display()
        ),
    );

    let assert = home
        .meow()
        .args([
            "run",
            "typed",
            "--var",
            r#"task={"name": "critical", "task_ids": "bf-xxx", "metadata": {"priority": 1}}"#,
            "--var",
            r#"items=[{"id": "a"}, {"id": "b"}]"#,
        ])
        .assert()
        .success();

    // The binder saw the integer through the path expression
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "1");

    // And the persisted document kept every type
    let doc = home.run_doc(&run_id_from(assert.get_output()));
    let task = &doc["variables"]["task"];
    assert_eq!(task["name"], "critical");
    assert_eq!(task["task_ids"], "bf-xxx");
    assert_eq!(task["metadata"]["priority"], 1);
    assert!(task["metadata"]["priority"].is_i64());
    assert_eq!(doc["variables"]["items"][1]["id"], "b");
}

#[test]
fn required_variable_missing_is_an_error() {
    let home = MeowHome::new();
    home.workflow(
        "strict",
        r#"
[main]
name = "strict"

[main.variables.task]
required = true
type = "object"
"#,
    );

    let assert = home.meow().args(["run", "strict"]).assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("task"), "stderr: {}", stderr);
}
