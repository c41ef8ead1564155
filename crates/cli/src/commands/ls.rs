// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `meow ls` - enumerate runnable workflows and collections

use anyhow::Result;
use clap::Args;
use meow_core::Config;
use meow_workflow::list_workflows;

#[derive(Args)]
pub struct LsArgs {
    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: LsArgs) -> Result<i32> {
    let config = Config::from_env();
    let listings = list_workflows(&config.workflow_dir)?;

    if args.json {
        println!("{}", serde_json::to_string(&listings)?);
        return Ok(0);
    }

    if listings.is_empty() {
        eprintln!("no workflows in {}", config.workflow_dir.display());
        return Ok(0);
    }
    for listing in listings {
        match listing.entrypoint {
            Some(entrypoint) => println!("{} (collection, entry {})", listing.workflow, entrypoint),
            None => println!("{}", listing.workflow),
        }
    }
    Ok(0)
}
