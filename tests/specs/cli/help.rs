//! CLI surface sanity: help text and argument errors.

use crate::prelude::MeowHome;

#[test]
fn help_lists_subcommands() {
    let home = MeowHome::new();
    let assert = home.meow().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for subcommand in ["run", "resume", "done", "event", "await-event", "ls"] {
        assert!(output.contains(subcommand), "help missing '{}'", subcommand);
    }
}

#[test]
fn run_requires_a_target() {
    let home = MeowHome::new();
    home.meow().arg("run").assert().failure();
}

#[test]
fn run_unknown_workflow_fails_with_message() {
    let home = MeowHome::new();
    let assert = home.meow().args(["run", "ghost"]).assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("ghost"));
}

#[test]
fn done_outside_a_session_fails() {
    let home = MeowHome::new();
    let assert = home.meow().arg("done").assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("MEOW_AGENT_ID"));
}

#[test]
fn resume_unknown_run_fails() {
    let home = MeowHome::new();
    home.meow().args(["resume", "no-such-run"]).assert().failure();
}
