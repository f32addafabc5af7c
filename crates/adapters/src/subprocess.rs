// SPDX-License-Identifier: MIT

//! Subprocess execution helpers shared by the sandbox manager and the agent
//! process adapter.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for git worktree operations.
pub const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for git branch-listing/deletion operations.
pub const GIT_BRANCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for quality-gate commands run in a sandbox.
pub const GATE_TIMEOUT: Duration = Duration::from_secs(300);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting timeout
/// expiration into a descriptive error. The child is killed on drop if the
/// timeout elapses.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}
