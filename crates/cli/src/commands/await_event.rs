// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `meow await-event` - block until an event arrives
//!
//! Exit 0 when matched, non-zero on timeout, which makes this directly
//! usable as a `branch` condition command.

use super::client_from_env;
use anyhow::{bail, Context, Result};
use clap::Args;
use meow_core::{parse_duration, Value};
use meow_engine::{Request, Response};

#[derive(Args)]
pub struct AwaitEventArgs {
    /// Event type to wait for
    pub event_type: String,

    /// How long to wait (e.g. "30s", "5m")
    #[arg(long, default_value = "30s")]
    pub timeout: String,

    /// Payload equality constraint, repeatable: --predicate key=value
    #[arg(long = "predicate", value_name = "KEY=VALUE")]
    pub predicates: Vec<String>,
}

pub async fn execute(args: AwaitEventArgs) -> Result<i32> {
    let timeout =
        parse_duration(&args.timeout).map_err(|e| anyhow::anyhow!("invalid --timeout: {}", e))?;

    let mut predicate = Vec::new();
    for raw in &args.predicates {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("invalid --predicate '{}': expected key=value", raw);
        };
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        predicate.push((key.to_string(), value));
    }

    let client = client_from_env()?;
    let response = client
        .request(&Request::Await {
            event_type: args.event_type,
            predicate,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
        .context("awaiting event from the engine")?;

    match response {
        Response::Matched { payload } => {
            println!("{}", serde_json::to_string(&payload)?);
            Ok(0)
        }
        Response::TimedOut => Ok(1),
        other => bail!("engine error: {:?}", other),
    }
}
