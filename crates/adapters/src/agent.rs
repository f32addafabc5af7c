// SPDX-License-Identifier: MIT

//! The coding-agent subprocess adapter: spawns the external agent binary,
//! streams its structured JSON stdout, and reports the terminal outcome.
//!
//! The agent writes one JSON object per line to stdout as it works. The
//! parser here is line-oriented and incremental so the watchdog can observe
//! progress (event counts, last-progress timestamp) while the process is
//! still running, not only after it exits.

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use supervisor_core::EventSeverity;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(String),
    #[error("failed to read agent stdout: {0}")]
    Io(String),
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentSpawnConfig {
    pub binary: PathBuf,
    pub working_dir: PathBuf,
    pub prompt: String,
    pub timeout: Duration,
    pub extra_args: Vec<String>,
}

/// One JSON event parsed from the agent's stdout stream.
#[derive(Debug, Clone)]
pub struct RawAgentEvent {
    pub event_type: String,
    pub severity: EventSeverity,
    pub message: String,
    pub data: HashMap<String, serde_json::Value>,
    pub source_line: u64,
}

/// A discovered-issue candidate parsed from a `discovery` event, before
/// deduplication.
#[derive(Debug, Clone)]
pub struct RawDiscovery {
    pub title: String,
    pub description: String,
}

/// Wire shape of one JSON line on the agent's stdout.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

fn parse_severity(raw: Option<&str>) -> EventSeverity {
    match raw {
        Some("warning") => EventSeverity::Warning,
        Some("error") => EventSeverity::Error,
        _ => EventSeverity::Info,
    }
}

/// The outcome of one agent run: whatever we observed before it exited or
/// was cancelled.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub exit_code: Option<i32>,
    pub events: Vec<RawAgentEvent>,
    pub discoveries: Vec<RawDiscovery>,
    pub cancelled: bool,
    pub timed_out: bool,
    pub duration: Duration,
}

impl AgentOutcome {
    /// Success requires a clean exit, no timeout, and no cancellation; the
    /// caller still checks for a terminal event of its own choosing.
    pub fn process_succeeded(&self) -> bool {
        !self.cancelled && !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs the external coding-agent binary for one mission.
#[async_trait]
pub trait AgentProcess: Send + Sync {
    /// `progress`, when given, receives each parsed event as it is observed
    /// on the agent's stdout stream, before the run completes — this is how
    /// the watchdog's telemetry monitor stays current while the agent is
    /// still working rather than only after it exits.
    async fn run(
        &self,
        config: AgentSpawnConfig,
        cancel: CancellationToken,
        progress: Option<UnboundedSender<RawAgentEvent>>,
    ) -> Result<AgentOutcome, AgentError>;
}

/// `AgentProcess` backed by a real OS subprocess.
pub struct SubprocessAgent;

impl Default for SubprocessAgent {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl AgentProcess for SubprocessAgent {
    async fn run(
        &self,
        config: AgentSpawnConfig,
        cancel: CancellationToken,
        progress: Option<UnboundedSender<RawAgentEvent>>,
    ) -> Result<AgentOutcome, AgentError> {
        let started = std::time::Instant::now();
        let mut cmd = Command::new(&config.binary);
        cmd.args(&config.extra_args)
            .arg(&config.prompt)
            .current_dir(&config.working_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| AgentError::Spawn(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Spawn("agent stdout not piped".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut events = Vec::new();
        let mut discoveries = Vec::new();
        let mut source_line: u64 = 0;
        let mut cancelled = false;
        let mut timed_out = false;

        let exit_code = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    cancelled = true;
                    terminate(&mut child).await;
                    break None;
                }

                _ = tokio::time::sleep(config.timeout), if !config.timeout.is_zero() => {
                    timed_out = true;
                    terminate(&mut child).await;
                    break None;
                }

                line = lines.next_line() => {
                    match line.map_err(|e| AgentError::Io(e.to_string()))? {
                        Some(raw_line) => {
                            source_line += 1;
                            if let Some((event, discovery)) = parse_line(&raw_line, source_line) {
                                if let Some(tx) = &progress {
                                    let _ = tx.send(event.clone());
                                }
                                events.push(event);
                                if let Some(discovery) = discovery {
                                    discoveries.push(discovery);
                                }
                            }
                        }
                        None => {
                            let status = child.wait().await.map_err(|e| AgentError::Io(e.to_string()))?;
                            break status.code();
                        }
                    }
                }
            }
        };

        Ok(AgentOutcome {
            exit_code,
            events,
            discoveries,
            cancelled,
            timed_out,
            duration: started.elapsed(),
        })
    }
}

/// Send SIGTERM, give the process a moment to exit cleanly, then SIGKILL.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        let grace = tokio::time::sleep(Duration::from_secs(5));
        tokio::select! {
            _ = child.wait() => return,
            _ = grace => {}
        }
    }
    let _ = child.kill().await;
    let _ = child.wait().await;
}

fn parse_line(line: &str, source_line: u64) -> Option<(RawAgentEvent, Option<RawDiscovery>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let wire: WireEvent = match serde_json::from_str(trimmed) {
        Ok(w) => w,
        Err(_) => {
            return Some((
                RawAgentEvent {
                    event_type: "unparsed_output".to_string(),
                    severity: EventSeverity::Info,
                    message: trimmed.to_string(),
                    data: HashMap::new(),
                    source_line,
                },
                None,
            ));
        }
    };

    let discovery = if wire.event_type == "discovery" {
        wire.title.clone().map(|title| RawDiscovery {
            title,
            description: wire.description.clone().unwrap_or_default(),
        })
    } else {
        None
    };

    let event = RawAgentEvent {
        event_type: wire.event_type,
        severity: parse_severity(wire.severity.as_deref()),
        message: wire.message,
        data: wire.data,
        source_line,
    };

    Some((event, discovery))
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Deterministic `AgentProcess` for tests: replays a scripted sequence
    /// of raw stdout lines and a final outcome without spawning anything.
    pub struct FakeAgent {
        stdout_lines: Vec<String>,
        exit_code: Option<i32>,
        /// If set, the run blocks until `cancel` fires instead of returning.
        hang_until_cancelled: bool,
        invocations: Mutex<Vec<AgentSpawnConfig>>,
    }

    impl FakeAgent {
        pub fn new(stdout_lines: Vec<String>, exit_code: Option<i32>) -> Self {
            Self {
                stdout_lines,
                exit_code,
                hang_until_cancelled: false,
                invocations: Mutex::new(Vec::new()),
            }
        }

        pub fn hanging() -> Self {
            Self {
                stdout_lines: Vec::new(),
                exit_code: None,
                hang_until_cancelled: true,
                invocations: Mutex::new(Vec::new()),
            }
        }

        pub fn invocation_count(&self) -> usize {
            self.invocations.lock().len()
        }
    }

    #[async_trait]
    impl AgentProcess for FakeAgent {
        async fn run(
            &self,
            config: AgentSpawnConfig,
            cancel: CancellationToken,
            progress: Option<UnboundedSender<RawAgentEvent>>,
        ) -> Result<AgentOutcome, AgentError> {
            self.invocations.lock().push(config.clone());

            if self.hang_until_cancelled {
                cancel.cancelled().await;
                return Ok(AgentOutcome {
                    exit_code: None,
                    events: Vec::new(),
                    discoveries: Vec::new(),
                    cancelled: true,
                    timed_out: false,
                    duration: Duration::ZERO,
                });
            }

            let mut events = Vec::new();
            let mut discoveries = Vec::new();
            for (index, line) in self.stdout_lines.iter().enumerate() {
                if let Some((event, discovery)) = parse_line(line, index as u64 + 1) {
                    if let Some(tx) = &progress {
                        let _ = tx.send(event.clone());
                    }
                    events.push(event);
                    if let Some(discovery) = discovery {
                        discoveries.push(discovery);
                    }
                }
            }

            Ok(AgentOutcome {
                exit_code: self.exit_code,
                events,
                discoveries,
                cancelled: false,
                timed_out: false,
                duration: Duration::ZERO,
            })
        }
    }
}
