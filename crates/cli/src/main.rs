// SPDX-License-Identifier: MIT

//! `supervisor`: the executor runtime's command-line front end. Thin I/O
//! wrapper around `supervisor-engine` — config loading, process lifecycle
//! (PID lock, signal handling, logging) and a handful of tracker-inspection
//! commands live here; none of the core loop logic does (spec.md §1).

mod commands;
mod config_file;
mod lock;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AI-agent execution supervisor.
#[derive(Parser)]
#[command(name = "supervisor", version, about = "AI-agent execution supervisor")]
struct Cli {
    /// Root directory holding the tracker WAL, sandbox root, and PID lock.
    /// Defaults to the current directory.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the executor runtime and block until stopped.
    Run(commands::run::RunArgs),
    /// Inspect and seed the issue tracker.
    Issue(commands::issue::IssueArgs),
    /// Inspect registered executor instances.
    Instance(commands::instance::InstanceArgs),
    /// Configuration file helpers.
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let state_dir = cli
        .state_dir
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    match cli.command {
        Command::Run(args) => commands::run::run(state_dir, args).await,
        Command::Issue(args) => commands::issue::run(state_dir, args).await,
        Command::Instance(args) => commands::instance::run(state_dir, args).await,
        Command::Config(args) => commands::config::run(state_dir, args),
    }
}
