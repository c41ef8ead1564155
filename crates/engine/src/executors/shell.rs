// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell executor: child processes for `shell` steps and branch conditions.

use super::{ConditionOutcome, ExecOutcome};
use indexmap::IndexMap;
use meow_core::step::{CaptureParse, ShellOutputSource, ShellOutputSpec};
use meow_core::{ErrorKind, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Grace between SIGTERM and SIGKILL on cancellation.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Everything a finished child process gives us.
struct ShellRun {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

enum RunEnd {
    Finished(ShellRun),
    TimedOut,
    Cancelled,
}

/// Run a `shell` step to completion.
pub async fn run_shell(
    command: String,
    cwd: std::path::PathBuf,
    env: Vec<(String, String)>,
    output_spec: IndexMap<String, ShellOutputSpec>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> ExecOutcome {
    match run_child(&command, &cwd, &env, timeout, &cancel).await {
        Ok(RunEnd::Finished(run)) => {
            if run.exit_code == 0 {
                ExecOutcome::Success {
                    outputs: capture_outputs(&output_spec, &run),
                }
            } else {
                let mut message = format!("command exited with status {}", run.exit_code);
                let stderr = run.stderr.trim();
                if !stderr.is_empty() {
                    message.push_str(": ");
                    message.push_str(stderr);
                }
                ExecOutcome::Error {
                    kind: ErrorKind::Exit,
                    message,
                }
            }
        }
        Ok(RunEnd::TimedOut) => ExecOutcome::Error {
            kind: ErrorKind::Timeout,
            message: "command exceeded step timeout".to_string(),
        },
        Ok(RunEnd::Cancelled) => ExecOutcome::Error {
            kind: ErrorKind::Internal,
            message: "cancelled".to_string(),
        },
        Err(message) => ExecOutcome::Error {
            kind: ErrorKind::Internal,
            message,
        },
    }
}

/// Run a branch condition: exit 0 is true, non-zero is false.
pub async fn run_condition(
    command: String,
    cwd: std::path::PathBuf,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> ExecOutcome {
    match run_child(&command, &cwd, &env, timeout, &cancel).await {
        Ok(RunEnd::Finished(run)) => ExecOutcome::Condition {
            taken: if run.exit_code == 0 {
                ConditionOutcome::True
            } else {
                ConditionOutcome::False
            },
        },
        Ok(RunEnd::TimedOut) => ExecOutcome::Condition {
            taken: ConditionOutcome::TimedOut,
        },
        Ok(RunEnd::Cancelled) => ExecOutcome::Error {
            kind: ErrorKind::Internal,
            message: "cancelled".to_string(),
        },
        Err(message) => ExecOutcome::Error {
            kind: ErrorKind::Internal,
            message,
        },
    }
}

async fn run_child(
    command: &str,
    cwd: &std::path::Path,
    env: &[(String, String)],
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<RunEnd, String> {
    let wrapped = format!("set -euo pipefail\n{command}");
    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(&wrapped)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("failed to spawn shell: {}", e))?;

    // Drain pipes concurrently so a chatty child never blocks on a full pipe
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(read_all(stdout));
    let stderr_task = tokio::spawn(read_all(stderr));

    let end = tokio::select! {
        status = child.wait() => {
            let exit_code = status
                .map_err(|e| format!("wait failed: {}", e))?
                .code()
                .unwrap_or(-1);
            RunEnd::Finished(ShellRun {
                exit_code,
                stdout: stdout_task.await.unwrap_or_default(),
                stderr: stderr_task.await.unwrap_or_default(),
            })
        }
        _ = sleep_opt(timeout) => {
            terminate(&mut child).await;
            RunEnd::TimedOut
        }
        _ = cancel.cancelled() => {
            terminate(&mut child).await;
            RunEnd::Cancelled
        }
    };

    Ok(end)
}

/// Sleep for the duration, or forever when no timeout is set.
async fn sleep_opt(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

async fn read_all(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).to_string()
}

/// SIGTERM, grace period, then SIGKILL.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        let graceful = tokio::time::timeout(KILL_GRACE, child.wait()).await;
        if graceful.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Build the step's outputs per its capture spec.
fn capture_outputs(
    spec: &IndexMap<String, ShellOutputSpec>,
    run: &ShellRun,
) -> IndexMap<String, Value> {
    let mut outputs = IndexMap::new();
    for (name, capture) in spec {
        let value = match capture.source {
            ShellOutputSource::ExitCode => Value::Integer(run.exit_code as i64),
            ShellOutputSource::Stdout => capture_text(&run.stdout, capture.parse),
            ShellOutputSource::Stderr => capture_text(&run.stderr, capture.parse),
        };
        outputs.insert(name.clone(), value);
    }
    outputs
}

fn capture_text(text: &str, parse: Option<CaptureParse>) -> Value {
    let trimmed = text.trim_end_matches('\n');
    match parse {
        // JSON parse with fallback to the raw string
        Some(CaptureParse::Json) => serde_json::from_str::<Value>(trimmed)
            .unwrap_or_else(|_| Value::String(trimmed.to_string())),
        None => Value::String(trimmed.to_string()),
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
