// SPDX-License-Identifier: MIT

//! The append-only domain event log that the write-ahead log persists and
//! [`crate::state::MaterializedState`] replays. Every mutation the tracker
//! store exposes is expressed as one of these variants; nothing else
//! changes state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supervisor_core::{
    AgentEvent, AttemptId, ExecutorId, ExecutionStatus, IssueId, IssuePriority, IssueStatus,
    IssueType,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageEvent {
    IssueCreated {
        id: IssueId,
        title: String,
        description: String,
        priority: IssuePriority,
        issue_type: IssueType,
        created_at: DateTime<Utc>,
    },
    IssueFieldsUpdated {
        id: IssueId,
        description: Option<String>,
        design_notes: Option<Option<String>>,
        acceptance_criteria: Option<Option<String>>,
        priority: Option<IssuePriority>,
        assignee: Option<Option<String>>,
        updated_at: DateTime<Utc>,
    },
    IssueStatusChanged {
        id: IssueId,
        status: IssueStatus,
        updated_at: DateTime<Utc>,
    },
    IssueClosed {
        id: IssueId,
        reason: String,
        updated_at: DateTime<Utc>,
    },
    CommentAdded {
        issue_id: IssueId,
        author: String,
        body: String,
        created_at: DateTime<Utc>,
    },
    DependencyAdded {
        issue_id: IssueId,
        depends_on: IssueId,
    },
    DependencyRemoved {
        issue_id: IssueId,
        depends_on: IssueId,
    },
    LabelAdded {
        issue_id: IssueId,
        label: String,
    },
    LabelRemoved {
        issue_id: IssueId,
        label: String,
    },

    InstanceRegistered {
        id: ExecutorId,
        hostname: String,
        pid: u32,
        version: String,
        started_at: DateTime<Utc>,
    },
    InstanceHeartbeat {
        id: ExecutorId,
        at: DateTime<Utc>,
    },
    InstanceStopped {
        id: ExecutorId,
        at: DateTime<Utc>,
    },
    InstanceCrashed {
        id: ExecutorId,
    },
    InstanceDeleted {
        id: ExecutorId,
    },

    ClaimAcquired {
        issue_id: IssueId,
        executor_id: ExecutorId,
        claimed_at: DateTime<Utc>,
    },
    ExecutionStateChanged {
        issue_id: IssueId,
        state: ExecutionStatus,
        error_message: Option<String>,
    },
    CheckpointSaved {
        issue_id: IssueId,
        checkpoint_data: serde_json::Value,
    },
    ClaimReleased {
        issue_id: IssueId,
    },
    ClaimReleasedAndReopened {
        issue_id: IssueId,
        error_message: String,
        at: DateTime<Utc>,
    },
    ClaimReleasedAndBlocked {
        issue_id: IssueId,
        reason: String,
        at: DateTime<Utc>,
    },

    AttemptStarted {
        id: AttemptId,
        issue_id: IssueId,
        attempt_number: u32,
        started_at: DateTime<Utc>,
    },
    AttemptFinished {
        id: AttemptId,
        completed_at: DateTime<Utc>,
        success: bool,
        exit_code: Option<i32>,
        summary: String,
    },

    AgentEventStored {
        event: Box<AgentEvent>,
    },
    AgentEventsDeleted {
        ids: Vec<String>,
    },

    ConfigSet {
        key: String,
        value: serde_json::Value,
    },
}
