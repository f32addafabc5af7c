// SPDX-License-Identifier: MIT

//! Domain types for the execution supervisor: issues, executor instances,
//! the per-issue claim/execution state machine, agent events, sandboxes,
//! and configuration. No I/O lives here — every type is a plain value type
//! or a pure function over one.

pub mod clock;
pub mod config;
pub mod event;
pub mod execution;
pub mod id;
pub mod instance;
pub mod issue;
#[macro_use]
pub mod macros;
pub mod oracle;
pub mod sandbox;
pub mod slug;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    ConfigError, ConfigLoadError, DeduplicationConfig, EventRetentionConfig, SupervisorConfig,
    WatchdogConfig,
};
pub use event::{AgentEvent, EventSeverity};
pub use execution::{ExecutionAttempt, ExecutionState, ExecutionStatus};
pub use id::{IdBuf, ID_MAX_LEN};
pub use instance::{ExecutorInstance, InstanceStatus};
pub use issue::{Issue, IssueComment, IssuePriority, IssueStatus, IssueType};
pub use oracle::{Anomaly, AnomalySeverity, Assessment, DedupCandidate, DedupVerdict, TelemetrySnapshot};
pub use sandbox::{Sandbox, SandboxStatus};
pub use slug::{mission_branch, slugify};

crate::define_id! {
    /// Identifies an issue in the tracker.
    pub struct IssueId("iss-");
}

crate::define_id! {
    /// Identifies one executor process instance, minted fresh on each start.
    pub struct ExecutorId("exe-");
}

crate::define_id! {
    /// Identifies one row in the append-only execution-attempt history.
    pub struct AttemptId("att-");
}

crate::define_id! {
    /// Identifies a sandbox (mission working directory + branch).
    pub struct SandboxId("sbx-");
}

crate::define_id! {
    /// Identifies one row in the append-only agent-event log.
    pub struct AgentEventId("evt-");
}
