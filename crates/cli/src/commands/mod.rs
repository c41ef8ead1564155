// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands: thin glue over the engine.

pub mod await_event;
pub mod done;
pub mod event;
pub mod ls;
pub mod resume;
pub mod run;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use meow_adapters::TmuxBackend;
use meow_core::{RunStatus, SystemClock, Value};
use meow_engine::{Engine, IpcClient};
use std::path::PathBuf;

/// Drive an engine to termination with ctrl-c wired to cancellation.
///
/// Exit code contract: 0 iff the run terminates `done`.
pub(crate) async fn drive(mut engine: Engine<TmuxBackend, SystemClock>) -> Result<i32> {
    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    match engine.run_to_completion().await {
        Ok(RunStatus::Done) => Ok(0),
        Ok(status) => {
            eprintln!("workflow failed: run ended {}", status);
            Ok(1)
        }
        Err(e) => {
            eprintln!("workflow failed: {}", e);
            Ok(1)
        }
    }
}

/// Parse repeated `--var name=value` flags into typed values.
///
/// Values parse as JSON when they can (numbers, booleans, arrays, objects)
/// and fall back to plain strings.
pub(crate) fn parse_var_flags(flags: &[String]) -> Result<IndexMap<String, Value>> {
    let mut vars = IndexMap::new();
    for flag in flags {
        let Some((name, raw)) = flag.split_once('=') else {
            bail!("invalid --var '{}': expected name=value", flag);
        };
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        vars.insert(name.to_string(), value);
    }
    Ok(vars)
}

/// IPC client for the run this process lives inside (`MEOW_SOCKET`).
pub(crate) fn client_from_env() -> Result<IpcClient> {
    let socket: PathBuf = std::env::var("MEOW_SOCKET")
        .context("MEOW_SOCKET is not set; is this command running inside a meow-managed session?")?
        .into();
    Ok(IpcClient::new(socket))
}

/// Engine dependencies for the production backend.
pub(crate) fn production_deps() -> meow_engine::EngineDeps<TmuxBackend, SystemClock> {
    let config = meow_core::Config::from_env();
    meow_engine::EngineDeps {
        backend: TmuxBackend::new(config.tmux_socket.clone()),
        clock: SystemClock,
        config,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
