// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `meow resume` - recover a persisted run and continue it

use super::{drive, production_deps};
use crate::logging;
use anyhow::Result;
use clap::Args;
use meow_core::RunId;
use meow_engine::Engine;

#[derive(Args)]
pub struct ResumeArgs {
    /// Run id printed by `meow run`
    pub run_id: String,
}

pub async fn execute(args: ResumeArgs) -> Result<i32> {
    let deps = production_deps();
    let logs_dir = deps.config.logs_dir.clone();
    let run_id = RunId::new(args.run_id);

    let engine = Engine::resume(deps, &run_id).await?;
    let _guard = logging::init(&logs_dir, engine.run_id())?;
    tracing::info!(run = %run_id, "resuming");
    drive(engine).await
}
