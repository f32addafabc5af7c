// SPDX-License-Identifier: MIT

//! Issue: the unit of tracked work, and its dependency edges.

use crate::IssueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority, 0 (highest) through 4 (lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssuePriority(pub u8);

impl IssuePriority {
    pub const HIGHEST: IssuePriority = IssuePriority(0);
    pub const LOWEST: IssuePriority = IssuePriority(4);

    /// Clamp an arbitrary integer into the valid 0-4 range.
    pub fn clamp(value: i64) -> Self {
        Self(value.clamp(0, 4) as u8)
    }
}

impl Default for IssuePriority {
    fn default() -> Self {
        IssuePriority(2)
    }
}

/// Status of an issue. Authoritative in the store; local copies are
/// read-mostly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
}

crate::simple_display! {
    IssueStatus {
        Open => "open",
        InProgress => "in_progress",
        Blocked => "blocked",
        Closed => "closed",
    }
}

impl IssueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, IssueStatus::Closed)
    }
}

/// Freeform classification of an issue (bug, feature, discovered-followup, ...).
///
/// The store treats this as an opaque label; the supervisor itself only
/// reads it for display and for the default type stamped on discoveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueType(pub String);

impl IssueType {
    pub fn task() -> Self {
        IssueType("task".to_string())
    }

    pub fn discovered() -> Self {
        IssueType("discovered".to_string())
    }

    pub fn escalation() -> Self {
        IssueType("escalation".to_string())
    }
}

impl Default for IssueType {
    fn default() -> Self {
        IssueType::task()
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of tracked work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub design_notes: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Option<String>,
    pub priority: IssuePriority,
    pub status: IssueStatus,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    #[serde(default)]
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Other issue IDs this issue depends on.
    #[serde(default)]
    pub depends_on: Vec<IssueId>,
}

impl Issue {
    /// Build a minimal open issue. Callers set labels/dependencies after.
    pub fn new(id: IssueId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            design_notes: None,
            acceptance_criteria: None,
            priority: IssuePriority::default(),
            status: IssueStatus::Open,
            issue_type: IssueType::default(),
            assignee: None,
            created_at: now,
            updated_at: now,
            labels: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn is_ready(&self, open_dependencies: &[IssueId]) -> bool {
        self.status == IssueStatus::Open && open_dependencies.is_empty()
    }

    crate::setters! {
        into {
            description: String,
        }
        option {
            design_notes: String,
            acceptance_criteria: String,
            assignee: String,
        }
        set {
            priority: IssuePriority,
            issue_type: IssueType,
            labels: Vec<String>,
            depends_on: Vec<IssueId>,
        }
    }
}

/// A comment attached to an issue (assessments, dedup rationale, escalation
/// summaries, and consecutive-failure notices all surface here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub issue_id: IssueId,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
