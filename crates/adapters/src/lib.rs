// SPDX-License-Identifier: MIT

//! External-process boundary for the execution supervisor: the AI oracle,
//! the coding-agent subprocess, and the git worktree sandbox lifecycle.
//! Nothing in `supervisor-engine` talks to a subprocess, a git binary, or
//! the oracle service directly — it goes through the traits in this crate.

pub mod agent;
pub mod oracle;
pub mod sandbox;
pub mod subprocess;

pub use agent::{AgentError, AgentOutcome, AgentProcess, AgentSpawnConfig, RawAgentEvent, RawDiscovery};
pub use oracle::{NullOracle, Oracle, OracleError};
pub use sandbox::{SandboxError, SandboxHandle, SandboxManager, WorktreeSandboxManager};

#[cfg(any(test, feature = "test-support"))]
pub use agent::fake::FakeAgent;
#[cfg(any(test, feature = "test-support"))]
pub use oracle::stub::StubOracle;
