// SPDX-License-Identifier: MIT

//! Load `SupervisorConfig` from `<state_dir>/supervisor.toml`, falling back
//! to defaults when the file doesn't exist.

use std::path::Path;
use supervisor_core::{ConfigLoadError, SupervisorConfig};

pub fn load(state_dir: &Path) -> Result<SupervisorConfig, ConfigLoadError> {
    let path = state_dir.join("supervisor.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => SupervisorConfig::from_toml(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let config = SupervisorConfig::default();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(ConfigLoadError::Io { path, source: e }),
    }
}
