// SPDX-License-Identifier: MIT

//! Error types surfaced by the engine crate.

use supervisor_adapters::{AgentError, OracleError, SandboxError};
use supervisor_storage::StoreError;
use thiserror::Error;

/// Failures that can abort `Supervisor::start`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] supervisor_core::ConfigError),
    #[error("store error during startup: {0}")]
    Store(#[from] StoreError),
}

/// A deadline passed to `Supervisor::stop` elapsed before every loop
/// signalled done.
#[derive(Debug, Error)]
#[error("shutdown deadline elapsed before all loops stopped")]
pub struct ShutdownDeadlineExceeded;

/// Failures encountered while driving one issue through the execution
/// pipeline. These never escape the pipeline; they are always translated
/// into a store write (release-and-reopen, release-and-block, or an error
/// event) by the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("cancelled during {0}")]
    Cancelled(&'static str),
}
