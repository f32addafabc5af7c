// SPDX-License-Identifier: MIT

//! The executor runtime: the four long-lived loops (§2), the per-issue
//! execution pipeline and state machine (§4.2-4.3), the watchdog and
//! intervention controller (§4.4), deduplication (§4.5), and the two
//! janitors (§4.6). Everything here is generic over the storage, clock,
//! oracle, sandbox, and agent traits defined in `supervisor-storage`,
//! `supervisor-core`, and `supervisor-adapters` — this crate owns
//! orchestration, not I/O.

pub mod context;
pub mod dedup;
pub mod error;
pub mod gates;
pub mod instance;
pub mod intervention;
pub mod janitor;
pub mod pipeline;
pub mod sandbox_registry;
pub mod supervisor;
pub mod telemetry;
pub mod watchdog;
pub mod work_loop;

pub use error::{PipelineError, ShutdownDeadlineExceeded, StartError};
pub use intervention::{InterventionController, InterventionRecord};
pub use pipeline::PipelineDeps;
pub use sandbox_registry::SandboxRegistry;
pub use supervisor::Supervisor;
pub use telemetry::TelemetryMonitor;
pub use watchdog::WatchdogDeps;
