// SPDX-License-Identifier: MIT

//! Materialized state built by replaying the write-ahead log.

mod events;
mod execution;
mod helpers;
mod instances;
mod issues;

use crate::event::StorageEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use supervisor_core::{
    AgentEvent, ExecutionAttempt, ExecutionState, ExecutorInstance, Issue, IssueComment,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub issues: HashMap<String, Issue>,
    pub comments: HashMap<String, Vec<IssueComment>>,
    pub instances: HashMap<String, ExecutorInstance>,
    pub execution_states: HashMap<String, ExecutionState>,
    pub attempts: HashMap<String, Vec<ExecutionAttempt>>,
    pub events: Vec<AgentEvent>,
    pub config: HashMap<String, serde_json::Value>,
}

impl MaterializedState {
    pub fn get_issue(&self, id: &str) -> Option<&Issue> {
        helpers::find_by_prefix(&self.issues, id)
    }

    /// Dependent issues: those whose `depends_on` names `issue_id`.
    pub fn dependents_of(&self, issue_id: &str) -> Vec<&Issue> {
        self.issues
            .values()
            .filter(|issue| issue.depends_on.iter().any(|d| d.as_str() == issue_id))
            .collect()
    }

    /// Apply one event to derive the next state.
    ///
    /// Handlers must be idempotent: WAL replay and immediate in-process
    /// application both call this, and must agree either way.
    pub fn apply_event(&mut self, event: &StorageEvent) {
        match event {
            StorageEvent::IssueCreated { .. }
            | StorageEvent::IssueFieldsUpdated { .. }
            | StorageEvent::IssueStatusChanged { .. }
            | StorageEvent::IssueClosed { .. }
            | StorageEvent::CommentAdded { .. }
            | StorageEvent::DependencyAdded { .. }
            | StorageEvent::DependencyRemoved { .. }
            | StorageEvent::LabelAdded { .. }
            | StorageEvent::LabelRemoved { .. } => issues::apply(self, event),

            StorageEvent::InstanceRegistered { .. }
            | StorageEvent::InstanceHeartbeat { .. }
            | StorageEvent::InstanceStopped { .. }
            | StorageEvent::InstanceCrashed { .. }
            | StorageEvent::InstanceDeleted { .. } => instances::apply(self, event),

            StorageEvent::ClaimAcquired { .. }
            | StorageEvent::ExecutionStateChanged { .. }
            | StorageEvent::CheckpointSaved { .. }
            | StorageEvent::ClaimReleased { .. }
            | StorageEvent::ClaimReleasedAndReopened { .. }
            | StorageEvent::ClaimReleasedAndBlocked { .. }
            | StorageEvent::AttemptStarted { .. }
            | StorageEvent::AttemptFinished { .. } => execution::apply(self, event),

            StorageEvent::AgentEventStored { .. }
            | StorageEvent::AgentEventsDeleted { .. }
            | StorageEvent::ConfigSet { .. } => events::apply(self, event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use supervisor_core::{ExecutorId, IssueId, IssuePriority, IssueType};

    #[test]
    fn apply_issue_created_is_idempotent() {
        let mut state = MaterializedState::default();
        let event = StorageEvent::IssueCreated {
            id: IssueId::new(),
            title: "title".to_string(),
            description: String::new(),
            priority: IssuePriority::default(),
            issue_type: IssueType::task(),
            created_at: Utc::now(),
        };
        state.apply_event(&event);
        state.apply_event(&event);
        assert_eq!(state.issues.len(), 1);
    }

    #[test]
    fn claim_acquired_flips_issue_to_in_progress() {
        let mut state = MaterializedState::default();
        let issue_id = IssueId::new();
        state.apply_event(&StorageEvent::IssueCreated {
            id: issue_id.clone(),
            title: "title".to_string(),
            description: String::new(),
            priority: IssuePriority::default(),
            issue_type: IssueType::task(),
            created_at: Utc::now(),
        });
        state.apply_event(&StorageEvent::ClaimAcquired {
            issue_id: issue_id.clone(),
            executor_id: ExecutorId::new(),
            claimed_at: Utc::now(),
        });

        assert_eq!(
            state.get_issue(issue_id.as_str()).unwrap().status,
            supervisor_core::IssueStatus::InProgress
        );
        assert!(state.execution_states[issue_id.as_str()].is_claimed());
    }

    #[test]
    fn release_and_reopen_clears_claim_and_reopens_issue() {
        let mut state = MaterializedState::default();
        let issue_id = IssueId::new();
        state.apply_event(&StorageEvent::IssueCreated {
            id: issue_id.clone(),
            title: "title".to_string(),
            description: String::new(),
            priority: IssuePriority::default(),
            issue_type: IssueType::task(),
            created_at: Utc::now(),
        });
        state.apply_event(&StorageEvent::ClaimAcquired {
            issue_id: issue_id.clone(),
            executor_id: ExecutorId::new(),
            claimed_at: Utc::now(),
        });
        state.apply_event(&StorageEvent::ClaimReleasedAndReopened {
            issue_id: issue_id.clone(),
            error_message: "boom".to_string(),
            at: Utc::now(),
        });

        assert_eq!(
            state.get_issue(issue_id.as_str()).unwrap().status,
            supervisor_core::IssueStatus::Open
        );
        assert!(!state.execution_states[issue_id.as_str()].is_claimed());
    }

    #[test]
    fn dependents_of_finds_issues_naming_a_dependency() {
        let mut state = MaterializedState::default();
        let base = IssueId::new();
        let dependent = IssueId::new();
        state.apply_event(&StorageEvent::IssueCreated {
            id: base.clone(),
            title: "base".to_string(),
            description: String::new(),
            priority: IssuePriority::default(),
            issue_type: IssueType::task(),
            created_at: Utc::now(),
        });
        state.apply_event(&StorageEvent::IssueCreated {
            id: dependent.clone(),
            title: "dependent".to_string(),
            description: String::new(),
            priority: IssuePriority::default(),
            issue_type: IssueType::task(),
            created_at: Utc::now(),
        });
        state.apply_event(&StorageEvent::DependencyAdded {
            issue_id: dependent.clone(),
            depends_on: base.clone(),
        });

        let dependents = state.dependents_of(base.as_str());
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, dependent);
    }
}
