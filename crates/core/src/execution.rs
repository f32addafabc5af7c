// SPDX-License-Identifier: MIT

//! The per-issue claim / execution state machine and the append-only
//! attempt log.

use crate::{AttemptId, ExecutorId, IssueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// States of the per-issue execution state machine.
///
/// `assessing` is entered unconditionally, even with AI supervision
/// disabled, so the machine's shape is invariant across configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Claimed,
    Assessing,
    Executing,
    Analyzing,
    Gates,
    Committing,
    Completed,
    Failed,
}

crate::simple_display! {
    ExecutionStatus {
        Pending => "pending",
        Claimed => "claimed",
        Assessing => "assessing",
        Executing => "executing",
        Analyzing => "analyzing",
        Gates => "gates",
        Committing => "committing",
        Completed => "completed",
        Failed => "failed",
    }
}

impl ExecutionStatus {
    /// Terminal states release the claim and end telemetry.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// The ordered happy-path sequence, used by the monotonicity property
    /// test.
    pub const HAPPY_PATH: [ExecutionStatus; 7] = [
        ExecutionStatus::Claimed,
        ExecutionStatus::Assessing,
        ExecutionStatus::Executing,
        ExecutionStatus::Analyzing,
        ExecutionStatus::Gates,
        ExecutionStatus::Committing,
        ExecutionStatus::Completed,
    ];
}

/// One row per issue: claim ownership plus current machine state.
/// Invariant: at most one non-terminal state per issue; the holder is the
/// instance named in `executor_instance_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub issue_id: IssueId,
    pub executor_instance_id: Option<ExecutorId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub state: ExecutionStatus,
    #[serde(default)]
    pub checkpoint_data: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ExecutionState {
    pub fn pending(issue_id: IssueId) -> Self {
        Self {
            issue_id,
            executor_instance_id: None,
            claimed_at: None,
            state: ExecutionStatus::Pending,
            checkpoint_data: None,
            error_message: None,
        }
    }

    /// Whether this claim is held by a live, non-terminal execution.
    pub fn is_claimed(&self) -> bool {
        self.executor_instance_id.is_some() && !self.state.is_terminal()
    }

    pub fn held_by(&self, executor: &ExecutorId) -> bool {
        self.executor_instance_id.as_ref() == Some(executor)
    }
}

/// Append-only audit row for one execution attempt on an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub id: AttemptId,
    pub issue_id: IssueId,
    /// Monotone per issue, starting at 1.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Tri-state: `None` = unknown/in-flight.
    pub success: Option<bool>,
    pub exit_code: Option<i32>,
    pub summary: String,
}

impl ExecutionAttempt {
    pub fn start(id: AttemptId, issue_id: IssueId, attempt_number: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            issue_id,
            attempt_number,
            started_at: now,
            completed_at: None,
            success: None,
            exit_code: None,
            summary: String::new(),
        }
    }

    pub fn finish(mut self, now: DateTime<Utc>, success: bool, exit_code: Option<i32>, summary: impl Into<String>) -> Self {
        self.completed_at = Some(now);
        self.success = Some(success);
        self.exit_code = exit_code;
        self.summary = summary.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_state_is_not_claimed() {
        let state = ExecutionState::pending(IssueId::new());
        assert!(!state.is_claimed());
    }

    #[test]
    fn claimed_state_is_claimed_until_terminal() {
        let mut state = ExecutionState::pending(IssueId::new());
        state.executor_instance_id = Some(ExecutorId::new());
        state.state = ExecutionStatus::Executing;
        assert!(state.is_claimed());

        state.state = ExecutionStatus::Completed;
        assert!(!state.is_claimed());
    }

    #[test]
    fn happy_path_is_all_non_terminal_states_in_order() {
        assert_eq!(ExecutionStatus::HAPPY_PATH.len(), 7);
        assert_eq!(ExecutionStatus::HAPPY_PATH[0], ExecutionStatus::Claimed);
        assert_eq!(
            *ExecutionStatus::HAPPY_PATH.last().unwrap(),
            ExecutionStatus::Completed
        );
    }
}
