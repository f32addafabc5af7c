// SPDX-License-Identifier: MIT

//! `supervisor run`: the flagship subcommand. Acquires the PID lock, sets up
//! logging, loads configuration, wires the concrete store/clock/oracle/
//! sandbox/agent together, and blocks running the four long-lived loops
//! until SIGINT/SIGTERM asks for a graceful shutdown (§5).

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use supervisor_adapters::{NullOracle, SubprocessAgent, WorktreeSandboxManager};
use supervisor_core::SystemClock;
use supervisor_engine::Supervisor;

/// Time allotted for the four loops to wind down once shutdown starts
/// before we give up waiting and return an error.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Args)]
pub struct RunArgs {
    /// Print the resolved configuration and exit without starting the
    /// loops.
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(state_dir: PathBuf, args: RunArgs) -> anyhow::Result<()> {
    let config = crate::config_file::load(&state_dir)?;
    if args.dry_run {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let _lock = crate::lock::PidLock::acquire(&state_dir)?;
    let _logging_guard = crate::logging::init(&state_dir)?;

    let store = Arc::new(super::open_store(&state_dir)?);
    let clock = SystemClock;
    let oracle = Arc::new(NullOracle);
    let sandbox_manager = Arc::new(WorktreeSandboxManager::new(config.parent_repo.clone()));
    let agent = Arc::new(SubprocessAgent::default());

    let supervisor = Supervisor::start(store, clock, oracle, sandbox_manager, agent, config).await?;

    tracing::info!(executor_id = %supervisor.executor_id(), "awaiting shutdown signal");
    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal received, stopping loops");

    supervisor.stop(SHUTDOWN_DEADLINE).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
