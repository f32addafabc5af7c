// SPDX-License-Identifier: MIT

//! CLI command implementations.

pub mod config;
pub mod instance;
pub mod issue;
pub mod run;

/// Open the tracker store at `<state_dir>/tracker.wal`, creating the state
/// directory and replaying the WAL if one already exists.
pub(crate) fn open_store(state_dir: &std::path::Path) -> anyhow::Result<supervisor_storage::FileStore> {
    std::fs::create_dir_all(state_dir)?;
    let wal_path = state_dir.join("tracker.wal");
    Ok(supervisor_storage::FileStore::open(&wal_path)?)
}
