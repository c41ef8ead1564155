// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `meow event` - emit an arbitrary event into the engine

use super::client_from_env;
use anyhow::{bail, Context, Result};
use clap::Args;
use indexmap::IndexMap;
use meow_core::Value;
use meow_engine::{Request, Response};

#[derive(Args)]
pub struct EventArgs {
    /// Event type, e.g. `agent-stopped` or any user-defined name
    pub event_type: String,

    /// Payload as a JSON object
    #[arg(long = "data-json", value_name = "JSON")]
    pub data_json: Option<String>,
}

pub async fn execute(args: EventArgs) -> Result<i32> {
    let payload: IndexMap<String, Value> = match &args.data_json {
        Some(raw) => serde_json::from_str(raw).context("--data-json is not a JSON object")?,
        None => IndexMap::new(),
    };

    let client = client_from_env()?;
    let response = client
        .request(&Request::Emit {
            event_type: args.event_type,
            payload,
        })
        .await
        .context("delivering event to the engine")?;

    match response {
        Response::Ok => Ok(0),
        other => bail!("engine rejected event: {:?}", other),
    }
}
