// SPDX-License-Identifier: MIT

//! Executor instance registry rows.

use crate::ExecutorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of one executor process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Crashed,
}

crate::simple_display! {
    InstanceStatus {
        Running => "running",
        Stopped => "stopped",
        Crashed => "crashed",
    }
}

/// A registered executor process.
///
/// One row per process start, keyed by a fresh [`ExecutorId`]. Heartbeat is
/// touched every poll tick; a peer with a stale heartbeat is reclassified
/// `crashed` by whichever other instance notices first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorInstance {
    pub id: ExecutorId,
    pub hostname: String,
    pub pid: u32,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: InstanceStatus,
}

impl ExecutorInstance {
    pub fn new(id: ExecutorId, hostname: impl Into<String>, pid: u32, version: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            pid,
            version: version.into(),
            started_at: now,
            last_heartbeat: now,
            status: InstanceStatus::Running,
        }
    }

    /// True if this instance's heartbeat has not been touched within
    /// `stale_threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_threshold: chrono::Duration) -> bool {
        self.status == InstanceStatus::Running && now - self.last_heartbeat > stale_threshold
    }
}
