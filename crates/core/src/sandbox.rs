// SPDX-License-Identifier: MIT

//! Sandbox: a per-mission working directory bound to a dedicated branch.

use crate::{IssueId, SandboxId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Active,
    TornDown,
    /// Kept on disk for debugging (`KeepSandboxOnFailure`).
    Preserved,
}

crate::simple_display! {
    SandboxStatus {
        Active => "active",
        TornDown => "torn_down",
        Preserved => "preserved",
    }
}

/// A mission's working directory + branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: SandboxId,
    pub issue_id: IssueId,
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub status: SandboxStatus,
}

impl Sandbox {
    pub fn new(
        id: SandboxId,
        issue_id: IssueId,
        path: PathBuf,
        branch: String,
        base_branch: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            issue_id,
            path,
            branch,
            base_branch: base_branch.into(),
            created_at: now,
            status: SandboxStatus::Active,
        }
    }

    /// A sandbox is either referenced by an active claim, or eligible for
    /// deletion.
    pub fn is_eligible_for_deletion(&self) -> bool {
        !matches!(self.status, SandboxStatus::Active)
    }
}
