// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run log file setup.
//!
//! Progress goes to stderr (stdout carries only the run id, for scripting);
//! the full structured log lands in `<logs_dir>/<run_id>.log`.

use anyhow::{Context, Result};
use meow_core::RunId;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(logs_dir: &Path, run_id: &RunId) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("creating log directory {}", logs_dir.display()))?;

    let file_appender =
        tracing_appender::rolling::never(logs_dir, format!("{}.log", run_id));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false),
        )
        .init();

    Ok(guard)
}
