// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `meow done` - called from inside an agent session to report outputs

use super::client_from_env;
use anyhow::{bail, Context, Result};
use clap::Args;
use indexmap::IndexMap;
use meow_core::Value;
use meow_engine::{Request, Response};

#[derive(Args)]
pub struct DoneArgs {
    /// Outputs as a JSON object, e.g. '{"task_id": "PROJ-123"}'
    #[arg(long = "outputs-json", value_name = "JSON")]
    pub outputs_json: Option<String>,
}

pub async fn execute(args: DoneArgs) -> Result<i32> {
    let agent_id = std::env::var("MEOW_AGENT_ID")
        .context("MEOW_AGENT_ID is not set; `meow done` only works inside an agent session")?;

    let outputs: IndexMap<String, Value> = match &args.outputs_json {
        Some(raw) => serde_json::from_str(raw).context("--outputs-json is not a JSON object")?,
        None => IndexMap::new(),
    };

    let client = client_from_env()?;
    let response = client
        .request(&Request::Done { agent_id, outputs })
        .await
        .context("delivering outputs to the engine")?;

    match response {
        Response::Ok => Ok(0),
        other => bail!("engine rejected outputs: {:?}", other),
    }
}
