// SPDX-License-Identifier: MIT

//! Quality gates: shell commands run in the sandbox after the agent exits,
//! all of which must pass before a mission is allowed to commit (§4.3 step
//! 6, `EnableQualityGates`).

use std::path::Path;
use supervisor_adapters::subprocess::{run_with_timeout, GATE_TIMEOUT};
use tokio::process::Command;
use tracing::warn;

/// Outcome of one configured gate command.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub command: String,
    pub passed: bool,
    pub output: String,
}

/// Run every configured gate command in `working_dir`, short-circuiting on
/// the first failure. Returns every result observed, in order.
pub async fn run(working_dir: &Path, commands: &[String]) -> Vec<GateResult> {
    let mut results = Vec::with_capacity(commands.len());

    for command in commands {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(working_dir);

        let result = match run_with_timeout(cmd, GATE_TIMEOUT, command).await {
            Ok(output) => GateResult {
                command: command.clone(),
                passed: output.status.success(),
                output: format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ),
            },
            Err(err) => {
                warn!(command, error = %err, "quality gate command failed to run");
                GateResult {
                    command: command.clone(),
                    passed: false,
                    output: err,
                }
            }
        };

        let passed = result.passed;
        results.push(result);
        if !passed {
            break;
        }
    }

    results
}

/// Whether every gate in `results` passed. An empty result set (no gates
/// configured) trivially passes.
pub fn all_passed(results: &[GateResult]) -> bool {
    results.iter().all(|r| r.passed)
}
