// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `meow run` - start a workflow

use super::{drive, parse_var_flags, production_deps};
use crate::logging;
use anyhow::{Context, Result};
use clap::Args;
use meow_engine::Engine;
use meow_workflow::{parse_workflow, resolve_run_target};

#[derive(Args)]
pub struct RunArgs {
    /// Workflow file path, workflow name, collection, or `coll:path`
    pub target: String,

    /// Workflow variable, repeatable: --var name=value (value may be JSON)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,
}

pub async fn execute(args: RunArgs) -> Result<i32> {
    let deps = production_deps();
    let logs_dir = deps.config.logs_dir.clone();

    let path = resolve_run_target(&deps.config.workflow_dir, &args.target)
        .with_context(|| format!("resolving workflow '{}'", args.target))?;
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading workflow {}", path.display()))?;
    let workflow = parse_workflow(&content)
        .with_context(|| format!("parsing workflow {}", path.display()))?;
    let provided = parse_var_flags(&args.vars)?;

    let engine = Engine::create(
        deps,
        workflow,
        path.to_string_lossy().to_string(),
        provided,
    )?;
    let _guard = logging::init(&logs_dir, engine.run_id())?;

    // The run id is the only thing stdout carries
    println!("{}", engine.run_id());
    drive(engine).await
}
