// SPDX-License-Identifier: MIT

//! Data transfer objects returned by the external AI oracle. The oracle
//! itself is an out-of-scope collaborator; only its request/response shapes
//! live in core so that both `supervisor-adapters` (which calls it) and
//! `supervisor-engine` (which consumes the result) can share them without a
//! dependency cycle.

use crate::{ExecutionStatus, IssueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of one active execution's telemetry, taken by the watchdog at
/// tick time and handed to the anomaly oracle. Built from the in-process
/// telemetry monitor, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub issue_id: IssueId,
    pub state: ExecutionStatus,
    pub elapsed_secs: u64,
    /// Count of agent events observed so far, keyed by event type.
    pub event_counts: HashMap<String, usize>,
    pub last_progress_at: Option<DateTime<Utc>>,
}

/// One discovered-issue candidate awaiting deduplication against the
/// existing issue set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupCandidate {
    pub title: String,
    pub description: String,
}

/// Result of assessing an issue before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub strategy: String,
    /// 0.0-1.0
    pub confidence: f64,
    pub estimated_effort: String,
    pub ordered_steps: Vec<String>,
    pub risks: Vec<String>,
}

/// Severity levels used by both the watchdog's anomaly oracle and
/// escalation-issue priority derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

crate::simple_display! {
    AnomalySeverity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl AnomalySeverity {
    /// Escalation-issue priority derived from severity:
    /// critical -> 0, high -> 1, medium -> 2, low -> 3.
    pub fn escalation_priority(self) -> crate::IssuePriority {
        match self {
            AnomalySeverity::Critical => crate::IssuePriority(0),
            AnomalySeverity::High => crate::IssuePriority(1),
            AnomalySeverity::Medium => crate::IssuePriority(2),
            AnomalySeverity::Low => crate::IssuePriority(3),
        }
    }
}

/// Result of one watchdog tick's anomaly check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub detected: bool,
    pub anomaly_type: String,
    pub severity: AnomalySeverity,
    /// 0.0-1.0
    pub confidence: f64,
    pub recommended_action: String,
    pub rationale: String,
}

impl Anomaly {
    pub fn none() -> Self {
        Self {
            detected: false,
            anomaly_type: String::new(),
            severity: AnomalySeverity::Low,
            confidence: 0.0,
            recommended_action: String::new(),
            rationale: String::new(),
        }
    }

    /// Whether this anomaly clears the watchdog's intervention bar.
    pub fn crosses_threshold(&self, min_confidence: f64, min_severity: AnomalySeverity) -> bool {
        self.detected && self.confidence >= min_confidence && self.severity >= min_severity
    }
}

/// Result of comparing one discovery candidate against the oracle during
/// deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupVerdict {
    /// The candidate this verdict is about.
    pub candidate_index: usize,
    /// `Some(id)` if a duplicate of an existing issue was found.
    pub duplicate_of: Option<IssueId>,
    /// 0.0-1.0 confidence that `duplicate_of` (or the within-batch match) is
    /// actually a duplicate.
    pub confidence: f64,
}
