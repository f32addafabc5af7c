// SPDX-License-Identifier: MIT

//! The tracker store capability set: the flat, atomic operation surface the
//! executor core depends on. No polymorphism crosses this boundary — a
//! backend is free to implement it however it likes, but callers never
//! branch on which one they're talking to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use supervisor_core::{
    AgentEvent, AttemptId, EventSeverity, ExecutionAttempt, ExecutionState, ExecutionStatus,
    ExecutorId, ExecutorInstance, Issue, IssueComment, IssueId, IssuePriority, IssueStatus,
    IssueType,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAL error: {0}")]
    Wal(#[from] crate::wal::WalError),
    #[error("issue {0} not found")]
    IssueNotFound(IssueId),
    #[error("adding dependency {depends_on} to {issue_id} would create a cycle")]
    DependencyCycle {
        issue_id: IssueId,
        depends_on: IssueId,
    },
}

/// Fields supplied when filing a new issue.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub priority: IssuePriority,
    pub issue_type: IssueType,
    pub labels: Vec<String>,
    pub depends_on: Vec<IssueId>,
}

/// Partial update applied to an existing issue. `None` leaves a field
/// untouched; an inner `Option` on nullable fields distinguishes "leave
/// alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub description: Option<String>,
    pub design_notes: Option<Option<String>>,
    pub acceptance_criteria: Option<Option<String>>,
    pub priority: Option<IssuePriority>,
    pub assignee: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub label: Option<String>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadyWorkFilter {
    pub limit: Option<usize>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IssueStatistics {
    pub open: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub closed: usize,
}

/// Result of the atomic claim operation.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(ExecutionState),
    /// Another executor claimed the issue first; not an error, loop again.
    RaceLost,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub issue_id: Option<IssueId>,
    pub severity: Option<EventSeverity>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait TrackerStore: Send + Sync {
    // --- Issues ---
    async fn create_issue(&self, new: NewIssue, now: DateTime<Utc>) -> Result<Issue, StoreError>;
    async fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>, StoreError>;
    async fn update_issue(
        &self,
        id: &IssueId,
        update: IssueUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn close_issue(
        &self,
        id: &IssueId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn search_issues(&self, filter: IssueFilter) -> Result<Vec<Issue>, StoreError>;
    async fn add_comment(
        &self,
        issue_id: &IssueId,
        author: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn get_comments(&self, issue_id: &IssueId) -> Result<Vec<IssueComment>, StoreError>;
    async fn get_dependencies(&self, issue_id: &IssueId) -> Result<Vec<IssueId>, StoreError>;
    async fn get_dependents(&self, issue_id: &IssueId) -> Result<Vec<IssueId>, StoreError>;
    async fn add_dependency(
        &self,
        issue_id: &IssueId,
        depends_on: &IssueId,
    ) -> Result<(), StoreError>;
    async fn remove_dependency(
        &self,
        issue_id: &IssueId,
        depends_on: &IssueId,
    ) -> Result<(), StoreError>;
    async fn add_label(&self, issue_id: &IssueId, label: &str) -> Result<(), StoreError>;
    async fn remove_label(&self, issue_id: &IssueId, label: &str) -> Result<(), StoreError>;
    async fn get_labels(&self, issue_id: &IssueId) -> Result<Vec<String>, StoreError>;
    async fn issue_statistics(&self) -> Result<IssueStatistics, StoreError>;

    // --- Ready work ---
    async fn ready_work(&self, filter: ReadyWorkFilter) -> Result<Vec<Issue>, StoreError>;

    // --- Instances ---
    async fn register_instance(
        &self,
        hostname: &str,
        pid: u32,
        version: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutorInstance, StoreError>;
    async fn update_heartbeat(&self, id: &ExecutorId, now: DateTime<Utc>) -> Result<(), StoreError>;
    async fn mark_instance_stopped(&self, id: &ExecutorId, now: DateTime<Utc>) -> Result<(), StoreError>;
    async fn list_active_instances(&self) -> Result<Vec<ExecutorInstance>, StoreError>;
    /// Mark every instance whose heartbeat is older than `stale_threshold`
    /// (relative to `now`) as crashed and release any non-terminal claim it
    /// holds. Returns the number of instances reclaimed.
    async fn cleanup_stale_instances(
        &self,
        stale_threshold: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
    /// Delete stopped instance rows older than `older_than`, keeping the
    /// `keep_n` most recently stopped regardless of age.
    async fn delete_old_stopped_instances(
        &self,
        older_than: chrono::Duration,
        keep_n: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    // --- Claim ---
    /// Atomically verify the issue is open and unclaimed, claim it for
    /// `executor_id`, and flip the issue to in-progress.
    async fn claim_issue(
        &self,
        issue_id: &IssueId,
        executor_id: &ExecutorId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    // --- Execution state ---
    async fn get_execution_state(
        &self,
        issue_id: &IssueId,
    ) -> Result<Option<ExecutionState>, StoreError>;
    async fn update_execution_state(
        &self,
        issue_id: &IssueId,
        state: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError>;
    async fn save_checkpoint(
        &self,
        issue_id: &IssueId,
        data: serde_json::Value,
    ) -> Result<(), StoreError>;
    async fn read_checkpoint(
        &self,
        issue_id: &IssueId,
    ) -> Result<Option<serde_json::Value>, StoreError>;
    async fn release_claim(&self, issue_id: &IssueId) -> Result<(), StoreError>;
    /// Atomically clear the claim, reopen the issue, and append a failed
    /// attempt row carrying `error_message`.
    async fn release_and_reopen(
        &self,
        issue_id: &IssueId,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Atomically clear the claim, block the issue, and append a comment
    /// summarizing `reason` (used once the consecutive-failure ceiling is
    /// hit, as an alternative to `release_and_reopen`).
    async fn release_and_block(
        &self,
        issue_id: &IssueId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // --- Execution history ---
    async fn get_execution_history(
        &self,
        issue_id: &IssueId,
    ) -> Result<Vec<ExecutionAttempt>, StoreError>;
    async fn start_attempt(
        &self,
        issue_id: &IssueId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionAttempt, StoreError>;
    async fn finish_attempt(
        &self,
        attempt_id: &AttemptId,
        success: bool,
        exit_code: Option<i32>,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // --- Agent events ---
    async fn store_event(&self, event: AgentEvent) -> Result<(), StoreError>;
    async fn query_events(&self, filter: EventFilter) -> Result<Vec<AgentEvent>, StoreError>;
    async fn events_for_issue(&self, issue_id: &IssueId) -> Result<Vec<AgentEvent>, StoreError>;
    async fn recent_events(&self, limit: usize) -> Result<Vec<AgentEvent>, StoreError>;
    /// Delete events older than `cutoff`, except events at or above
    /// `critical_severity` which are kept until `critical_cutoff`. Returns
    /// the number of events deleted, up to `batch_size` per call.
    async fn delete_events_older_than(
        &self,
        cutoff: DateTime<Utc>,
        critical_severity: EventSeverity,
        critical_cutoff: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<usize, StoreError>;
    /// For each issue with more than `limit` events, delete its oldest
    /// down to the limit. Returns the number of events deleted.
    async fn delete_events_over_per_issue_limit(
        &self,
        limit: usize,
        batch_size: usize,
    ) -> Result<usize, StoreError>;
    /// Delete the oldest events globally until total count is at or below
    /// `limit`. Returns the number of events deleted.
    async fn delete_events_over_global_limit(
        &self,
        limit: usize,
        batch_size: usize,
    ) -> Result<usize, StoreError>;
    async fn count_events_by_type(&self) -> Result<HashMap<String, usize>, StoreError>;
    /// Request storage compaction. A best-effort hint; backends that don't
    /// fragment may treat this as a no-op.
    async fn compact(&self) -> Result<(), StoreError>;

    // --- Config ---
    async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    async fn set_config(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
}
