// SPDX-License-Identifier: MIT

//! `supervisor instance`: list registered executor instances (§3 "Executor
//! instance").

use clap::{Args, Subcommand};
use std::path::PathBuf;
use supervisor_storage::TrackerStore;

#[derive(Args)]
pub struct InstanceArgs {
    #[command(subcommand)]
    command: InstanceCommand,
}

#[derive(Subcommand)]
enum InstanceCommand {
    /// List instances currently marked running.
    List,
}

pub async fn run(state_dir: PathBuf, args: InstanceArgs) -> anyhow::Result<()> {
    let store = super::open_store(&state_dir)?;
    match args.command {
        InstanceCommand::List => {
            for instance in store.list_active_instances().await? {
                println!(
                    "{}\t{}\tpid={}\t{}\tlast_heartbeat={}",
                    instance.id, instance.status, instance.pid, instance.version, instance.last_heartbeat
                );
            }
        }
    }
    Ok(())
}
