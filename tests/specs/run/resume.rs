//! Crash recovery: `meow resume` replays an interrupted shell step and the
//! run progresses to done without regressing past persisted work.

use crate::prelude::MeowHome;

/// Hand-craft a run document as a crashed engine would have left it:
/// step one persisted as `running`, its dependent still `pending`.
fn write_crashed_run(home: &MeowHome, run_id: &str, marker: &std::path::Path) {
    let workflow_path = home.workflow(
        "recovery",
        &format!(
            r#"
[main]
name = "recovery"

[[main.steps]]
id = "touchit"
executor = "shell"
command = "touch {marker} && echo x"

[[main.steps]]
id = "after"
executor = "shell"
command = "true"
needs = ["touchit"]
"#,
            marker = marker.display()
        ),
    );

    let doc = serde_json::json!({
        "id": run_id,
        "template": workflow_path.to_string_lossy(),
        "status": "running",
        "started_at": "2026-01-15T12:00:00Z",
        "steps": {
            "touchit": {
                "id": "touchit",
                "payload": {
                    "executor": "shell",
                    "command": format!("touch {} && echo x", marker.display()),
                },
                "status": "running"
            },
            "after": {
                "id": "after",
                "payload": {"executor": "shell", "command": "true"},
                "needs": ["touchit"],
                "status": "pending"
            }
        }
    });

    std::fs::create_dir_all(home.runs_dir()).unwrap();
    std::fs::write(
        home.runs_dir().join(format!("{}.json", run_id)),
        serde_json::to_string_pretty(&doc).unwrap(),
    )
    .unwrap();
}

#[test]
fn resume_replays_running_shell_step() {
    let home = MeowHome::new();
    let marker = home.path().join("marker");
    write_crashed_run(&home, "r-crashed", &marker);

    home.meow().args(["resume", "r-crashed"]).assert().success();

    assert!(marker.exists(), "interrupted command replayed");
    let doc = home.run_doc("r-crashed");
    assert_eq!(doc["status"], "done");
    assert_eq!(doc["steps"]["touchit"]["status"], "done");
    assert_eq!(doc["steps"]["after"]["status"], "done");
}

#[test]
fn resume_refuses_terminal_runs() {
    let home = MeowHome::new();
    let marker = home.path().join("marker");
    write_crashed_run(&home, "r-done", &marker);

    // Flip the persisted status to a terminal one
    let path = home.runs_dir().join("r-done.json");
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    doc["status"] = serde_json::json!("done");
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let assert = home.meow().args(["resume", "r-done"]).assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("terminal"), "stderr: {}", stderr);
    // The replayable command did not run
    assert!(!marker.exists());
}

#[test]
fn resume_twice_is_safe() {
    let home = MeowHome::new();
    let marker = home.path().join("marker");
    write_crashed_run(&home, "r-again", &marker);

    home.meow().args(["resume", "r-again"]).assert().success();
    // Second resume: the run is terminal now and is refused cleanly
    home.meow().args(["resume", "r-again"]).assert().failure();

    let doc = home.run_doc("r-again");
    assert_eq!(doc["status"], "done");
}
