// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! meow - workflow orchestrator for agent sessions

mod commands;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{await_event, done, event, ls, resume, run};

#[derive(Parser)]
#[command(
    name = "meow",
    version,
    about = "MEOW - orchestrate workflows of shell steps and interactive agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file or collection
    Run(run::RunArgs),
    /// Recover and continue a persisted run
    Resume(resume::ResumeArgs),
    /// Report this agent's outputs back to the engine (from inside a session)
    Done(done::DoneArgs),
    /// Emit an event into the running engine
    Event(event::EventArgs),
    /// Block until an event arrives or the timeout elapses
    #[command(name = "await-event")]
    AwaitEvent(await_event::AwaitEventArgs),
    /// List runnable workflows and collections
    Ls(ls::LsArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => run::execute(args).await,
        Commands::Resume(args) => resume::execute(args).await,
        Commands::Done(args) => done::execute(args).await,
        Commands::Event(args) => event::execute(args).await,
        Commands::AwaitEvent(args) => await_event::execute(args).await,
        Commands::Ls(args) => ls::execute(args),
    }
}
