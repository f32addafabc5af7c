// SPDX-License-Identifier: MIT

//! `supervisor config`: print or validate the configuration surface (§6).

use clap::{Args, Subcommand};
use std::path::PathBuf;
use supervisor_core::SupervisorConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the default configuration as TOML.
    Default,
    /// Validate the configuration file at `<state_dir>/supervisor.toml`.
    Validate,
}

pub fn run(state_dir: PathBuf, args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Default => {
            let toml = toml::to_string_pretty(&SupervisorConfig::default())?;
            print!("{toml}");
            Ok(())
        }
        ConfigCommand::Validate => {
            let config = crate::config_file::load(&state_dir)?;
            println!("configuration is valid");
            println!("poll_interval: {:?}", config.poll_interval);
            println!("enable_sandboxes: {}", config.enable_sandboxes);
            println!("enable_ai_supervision: {}", config.enable_ai_supervision);
            Ok(())
        }
    }
}
