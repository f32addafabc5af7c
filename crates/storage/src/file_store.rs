// SPDX-License-Identifier: MIT

//! [`FileStore`]: the one concrete [`TrackerStore`] backend. A single WAL
//! file plus an in-memory [`MaterializedState`] rebuilt by replaying it at
//! open. Every mutation appends one event and flushes before returning, so
//! "persisted before the side effect is observable" holds trivially.

use crate::event::StorageEvent;
use crate::state::MaterializedState;
use crate::store::{
    ClaimOutcome, EventFilter, IssueFilter, IssueStatistics, IssueUpdate, NewIssue,
    ReadyWorkFilter, StoreError, TrackerStore,
};
use crate::wal::Wal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use supervisor_core::{
    AgentEvent, AttemptId, EventSeverity, ExecutionAttempt, ExecutionState, ExecutionStatus,
    ExecutorId, ExecutorInstance, Issue, IssueComment, IssueId, IssueStatus,
};

pub struct FileStore {
    wal: Mutex<Wal>,
    state: Mutex<MaterializedState>,
}

impl FileStore {
    /// Open (or create) the WAL at `path` and replay it into memory.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut wal = Wal::open(path)?;
        let entries = wal.replay()?;

        let mut state = MaterializedState::default();
        for entry in &entries {
            state.apply_event(&entry.event);
        }

        Ok(Self {
            wal: Mutex::new(wal),
            state: Mutex::new(state),
        })
    }

    /// Append one event, flush it durably, then apply it to the in-memory
    /// state and return the locked state for the caller to read back from.
    fn commit(&self, event: StorageEvent) -> Result<(), StoreError> {
        {
            let mut wal = self.wal.lock();
            wal.append(&event)?;
            wal.flush()?;
        }
        self.state.lock().apply_event(&event);
        Ok(())
    }

    fn has_path(&self, state: &MaterializedState, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(issue) = state.issues.get(&current) {
                for dep in &issue.depends_on {
                    stack.push(dep.as_str().to_string());
                }
            }
        }
        false
    }
}

#[async_trait]
impl TrackerStore for FileStore {
    async fn create_issue(&self, new: NewIssue, now: DateTime<Utc>) -> Result<Issue, StoreError> {
        let id = IssueId::new();
        self.commit(StorageEvent::IssueCreated {
            id: id.clone(),
            title: new.title,
            description: new.description,
            priority: new.priority,
            issue_type: new.issue_type,
            created_at: now,
        })?;
        for label in new.labels {
            self.commit(StorageEvent::LabelAdded {
                issue_id: id.clone(),
                label,
            })?;
        }
        for dep in new.depends_on {
            self.add_dependency(&id, &dep).await?;
        }
        self.get_issue(&id).await?.ok_or(StoreError::IssueNotFound(id))
    }

    async fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>, StoreError> {
        Ok(self.state.lock().get_issue(id.as_str()).cloned())
    }

    async fn update_issue(
        &self,
        id: &IssueId,
        update: IssueUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::IssueFieldsUpdated {
            id: id.clone(),
            description: update.description,
            design_notes: update.design_notes,
            acceptance_criteria: update.acceptance_criteria,
            priority: update.priority,
            assignee: update.assignee,
            updated_at: now,
        })
    }

    async fn close_issue(
        &self,
        id: &IssueId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::IssueClosed {
            id: id.clone(),
            reason: reason.to_string(),
            updated_at: now,
        })
    }

    async fn search_issues(&self, filter: IssueFilter) -> Result<Vec<Issue>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .issues
            .values()
            .filter(|issue| filter.status.is_none_or(|s| issue.status == s))
            .filter(|issue| {
                filter
                    .label
                    .as_ref()
                    .is_none_or(|l| issue.labels.contains(l))
            })
            .filter(|issue| filter.assignee.as_deref() == issue.assignee.as_deref() || filter.assignee.is_none())
            .cloned()
            .collect())
    }

    async fn add_comment(
        &self,
        issue_id: &IssueId,
        author: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::CommentAdded {
            issue_id: issue_id.clone(),
            author: author.to_string(),
            body: body.to_string(),
            created_at: now,
        })
    }

    async fn get_comments(&self, issue_id: &IssueId) -> Result<Vec<IssueComment>, StoreError> {
        Ok(self
            .state
            .lock()
            .comments
            .get(issue_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_dependencies(&self, issue_id: &IssueId) -> Result<Vec<IssueId>, StoreError> {
        Ok(self
            .state
            .lock()
            .get_issue(issue_id.as_str())
            .map(|issue| issue.depends_on.clone())
            .unwrap_or_default())
    }

    async fn get_dependents(&self, issue_id: &IssueId) -> Result<Vec<IssueId>, StoreError> {
        Ok(self
            .state
            .lock()
            .dependents_of(issue_id.as_str())
            .into_iter()
            .map(|issue| issue.id.clone())
            .collect())
    }

    async fn add_dependency(
        &self,
        issue_id: &IssueId,
        depends_on: &IssueId,
    ) -> Result<(), StoreError> {
        {
            let state = self.state.lock();
            if self.has_path(&state, depends_on.as_str(), issue_id.as_str()) {
                return Err(StoreError::DependencyCycle {
                    issue_id: issue_id.clone(),
                    depends_on: depends_on.clone(),
                });
            }
        }
        self.commit(StorageEvent::DependencyAdded {
            issue_id: issue_id.clone(),
            depends_on: depends_on.clone(),
        })
    }

    async fn remove_dependency(
        &self,
        issue_id: &IssueId,
        depends_on: &IssueId,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::DependencyRemoved {
            issue_id: issue_id.clone(),
            depends_on: depends_on.clone(),
        })
    }

    async fn add_label(&self, issue_id: &IssueId, label: &str) -> Result<(), StoreError> {
        self.commit(StorageEvent::LabelAdded {
            issue_id: issue_id.clone(),
            label: label.to_string(),
        })
    }

    async fn remove_label(&self, issue_id: &IssueId, label: &str) -> Result<(), StoreError> {
        self.commit(StorageEvent::LabelRemoved {
            issue_id: issue_id.clone(),
            label: label.to_string(),
        })
    }

    async fn get_labels(&self, issue_id: &IssueId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .lock()
            .get_issue(issue_id.as_str())
            .map(|issue| issue.labels.clone())
            .unwrap_or_default())
    }

    async fn issue_statistics(&self) -> Result<IssueStatistics, StoreError> {
        let state = self.state.lock();
        let mut stats = IssueStatistics::default();
        for issue in state.issues.values() {
            match issue.status {
                IssueStatus::Open => stats.open += 1,
                IssueStatus::InProgress => stats.in_progress += 1,
                IssueStatus::Blocked => stats.blocked += 1,
                IssueStatus::Closed => stats.closed += 1,
            }
        }
        Ok(stats)
    }

    async fn ready_work(&self, filter: ReadyWorkFilter) -> Result<Vec<Issue>, StoreError> {
        let state = self.state.lock();
        let mut ready: Vec<Issue> = state
            .issues
            .values()
            .filter(|issue| {
                let open_deps: Vec<IssueId> = issue
                    .depends_on
                    .iter()
                    .filter(|dep| {
                        state
                            .get_issue(dep.as_str())
                            .map(|d| d.status != IssueStatus::Closed)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                issue.is_ready(&open_deps)
            })
            .filter(|issue| {
                filter
                    .label
                    .as_ref()
                    .is_none_or(|l| issue.labels.contains(l))
            })
            .cloned()
            .collect();

        ready.sort_by_key(|issue| (issue.priority, issue.created_at));
        if let Some(limit) = filter.limit {
            ready.truncate(limit);
        }
        Ok(ready)
    }

    async fn register_instance(
        &self,
        hostname: &str,
        pid: u32,
        version: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutorInstance, StoreError> {
        let id = ExecutorId::new();
        self.commit(StorageEvent::InstanceRegistered {
            id: id.clone(),
            hostname: hostname.to_string(),
            pid,
            version: version.to_string(),
            started_at: now,
        })?;
        Ok(self.state.lock().instances[id.as_str()].clone())
    }

    async fn update_heartbeat(&self, id: &ExecutorId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.commit(StorageEvent::InstanceHeartbeat {
            id: id.clone(),
            at: now,
        })
    }

    async fn mark_instance_stopped(&self, id: &ExecutorId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.commit(StorageEvent::InstanceStopped {
            id: id.clone(),
            at: now,
        })
    }

    async fn list_active_instances(&self) -> Result<Vec<ExecutorInstance>, StoreError> {
        Ok(self
            .state
            .lock()
            .instances
            .values()
            .filter(|i| i.status == supervisor_core::InstanceStatus::Running)
            .cloned()
            .collect())
    }

    async fn cleanup_stale_instances(
        &self,
        stale_threshold: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let stale_ids: Vec<ExecutorId> = {
            let state = self.state.lock();
            state
                .instances
                .values()
                .filter(|i| i.is_stale(now, stale_threshold))
                .map(|i| i.id.clone())
                .collect()
        };

        for id in &stale_ids {
            self.commit(StorageEvent::InstanceCrashed { id: id.clone() })?;

            let stuck_issues: Vec<IssueId> = {
                let state = self.state.lock();
                state
                    .execution_states
                    .values()
                    .filter(|execution| {
                        execution.is_claimed() && execution.held_by(id)
                    })
                    .map(|execution| execution.issue_id.clone())
                    .collect()
            };
            for issue_id in stuck_issues {
                self.release_and_reopen(&issue_id, "reclaimed stale", now).await?;
            }
        }

        Ok(stale_ids.len())
    }

    async fn delete_old_stopped_instances(
        &self,
        older_than: chrono::Duration,
        keep_n: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut stopped: Vec<ExecutorInstance> = {
            let state = self.state.lock();
            state
                .instances
                .values()
                .filter(|i| i.status == supervisor_core::InstanceStatus::Stopped)
                .cloned()
                .collect()
        };
        stopped.sort_by_key(|i| std::cmp::Reverse(i.last_heartbeat));

        let mut deleted = 0usize;
        for instance in stopped.into_iter().skip(keep_n as usize) {
            if now - instance.last_heartbeat > older_than {
                self.commit(StorageEvent::InstanceDeleted { id: instance.id })?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn claim_issue(
        &self,
        issue_id: &IssueId,
        executor_id: &ExecutorId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        // The verify-then-write must be one atomic critical section (spec.md
        // invariant 1): holding `state` across both the check and the apply
        // is what makes two concurrent callers on the same issue resolve to
        // exactly one `Claimed` and one `RaceLost`, rather than a window
        // where both observe "open" before either commits.
        let mut state = self.state.lock();
        let Some(issue) = state.get_issue(issue_id.as_str()) else {
            return Err(StoreError::IssueNotFound(issue_id.clone()));
        };
        if issue.status != IssueStatus::Open {
            return Ok(ClaimOutcome::RaceLost);
        }
        if let Some(execution) = state.execution_states.get(issue_id.as_str()) {
            if execution.is_claimed() {
                return Ok(ClaimOutcome::RaceLost);
            }
        }

        let event = StorageEvent::ClaimAcquired {
            issue_id: issue_id.clone(),
            executor_id: executor_id.clone(),
            claimed_at: now,
        };
        {
            let mut wal = self.wal.lock();
            wal.append(&event)?;
            wal.flush()?;
        }
        state.apply_event(&event);

        let execution = state.execution_states[issue_id.as_str()].clone();
        Ok(ClaimOutcome::Claimed(execution))
    }

    async fn get_execution_state(
        &self,
        issue_id: &IssueId,
    ) -> Result<Option<ExecutionState>, StoreError> {
        Ok(self.state.lock().execution_states.get(issue_id.as_str()).cloned())
    }

    async fn update_execution_state(
        &self,
        issue_id: &IssueId,
        state: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::ExecutionStateChanged {
            issue_id: issue_id.clone(),
            state,
            error_message,
        })
    }

    async fn save_checkpoint(
        &self,
        issue_id: &IssueId,
        data: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::CheckpointSaved {
            issue_id: issue_id.clone(),
            checkpoint_data: data,
        })
    }

    async fn read_checkpoint(
        &self,
        issue_id: &IssueId,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .state
            .lock()
            .execution_states
            .get(issue_id.as_str())
            .and_then(|e| e.checkpoint_data.clone()))
    }

    async fn release_claim(&self, issue_id: &IssueId) -> Result<(), StoreError> {
        self.commit(StorageEvent::ClaimReleased {
            issue_id: issue_id.clone(),
        })
    }

    async fn release_and_reopen(
        &self,
        issue_id: &IssueId,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::ClaimReleasedAndReopened {
            issue_id: issue_id.clone(),
            error_message: error_message.to_string(),
            at: now,
        })
    }

    async fn release_and_block(
        &self,
        issue_id: &IssueId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::ClaimReleasedAndBlocked {
            issue_id: issue_id.clone(),
            reason: reason.to_string(),
            at: now,
        })?;
        self.commit(StorageEvent::CommentAdded {
            issue_id: issue_id.clone(),
            author: "system".to_string(),
            body: reason.to_string(),
            created_at: now,
        })
    }

    async fn get_execution_history(
        &self,
        issue_id: &IssueId,
    ) -> Result<Vec<ExecutionAttempt>, StoreError> {
        Ok(self
            .state
            .lock()
            .attempts
            .get(issue_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn start_attempt(
        &self,
        issue_id: &IssueId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionAttempt, StoreError> {
        let attempt_number = self.next_attempt_number(issue_id);
        let id = AttemptId::new();
        self.commit(StorageEvent::AttemptStarted {
            id: id.clone(),
            issue_id: issue_id.clone(),
            attempt_number,
            started_at: now,
        })?;
        let attempts = self.state.lock().attempts.get(issue_id.as_str()).cloned().unwrap_or_default();
        attempts
            .into_iter()
            .find(|a| a.id == id)
            .ok_or(StoreError::IssueNotFound(issue_id.clone()))
    }

    async fn finish_attempt(
        &self,
        attempt_id: &AttemptId,
        success: bool,
        exit_code: Option<i32>,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.commit(StorageEvent::AttemptFinished {
            id: attempt_id.clone(),
            completed_at: now,
            success,
            exit_code,
            summary: summary.to_string(),
        })
    }

    async fn store_event(&self, event: AgentEvent) -> Result<(), StoreError> {
        self.commit(StorageEvent::AgentEventStored {
            event: Box::new(event),
        })
    }

    async fn query_events(&self, filter: EventFilter) -> Result<Vec<AgentEvent>, StoreError> {
        let state = self.state.lock();
        let mut events: Vec<AgentEvent> = state
            .events
            .iter()
            .filter(|e| filter.issue_id.as_ref().is_none_or(|id| e.issue_id.as_ref() == Some(id)))
            .filter(|e| filter.severity.is_none_or(|s| e.severity == s))
            .filter(|e| filter.event_type.as_ref().is_none_or(|t| &e.event_type == t))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn events_for_issue(&self, issue_id: &IssueId) -> Result<Vec<AgentEvent>, StoreError> {
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| e.issue_id.as_ref() == Some(issue_id))
            .cloned()
            .collect())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<AgentEvent>, StoreError> {
        let state = self.state.lock();
        let start = state.events.len().saturating_sub(limit);
        Ok(state.events[start..].to_vec())
    }

    async fn delete_events_older_than(
        &self,
        cutoff: DateTime<Utc>,
        critical_severity: EventSeverity,
        critical_cutoff: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<usize, StoreError> {
        let to_delete: Vec<String> = {
            let state = self.state.lock();
            state
                .events
                .iter()
                .filter(|e| {
                    if e.severity >= critical_severity {
                        e.timestamp < critical_cutoff
                    } else {
                        e.timestamp < cutoff
                    }
                })
                .take(batch_size)
                .map(|e| e.id.as_str().to_string())
                .collect()
        };
        if to_delete.is_empty() {
            return Ok(0);
        }
        let deleted = to_delete.len();
        self.commit(StorageEvent::AgentEventsDeleted { ids: to_delete })?;
        Ok(deleted)
    }

    async fn delete_events_over_per_issue_limit(
        &self,
        limit: usize,
        batch_size: usize,
    ) -> Result<usize, StoreError> {
        let to_delete: Vec<String> = {
            let state = self.state.lock();
            let mut by_issue: HashMap<String, Vec<&AgentEvent>> = HashMap::new();
            for event in &state.events {
                if let Some(issue_id) = &event.issue_id {
                    by_issue.entry(issue_id.as_str().to_string()).or_default().push(event);
                }
            }
            let mut ids = Vec::new();
            for events in by_issue.values_mut() {
                events.sort_by_key(|e| e.timestamp);
                if events.len() > limit {
                    let excess = events.len() - limit;
                    ids.extend(events.iter().take(excess).map(|e| e.id.as_str().to_string()));
                }
            }
            ids.truncate(batch_size);
            ids
        };
        if to_delete.is_empty() {
            return Ok(0);
        }
        let deleted = to_delete.len();
        self.commit(StorageEvent::AgentEventsDeleted { ids: to_delete })?;
        Ok(deleted)
    }

    async fn delete_events_over_global_limit(
        &self,
        limit: usize,
        batch_size: usize,
    ) -> Result<usize, StoreError> {
        let to_delete: Vec<String> = {
            let state = self.state.lock();
            if state.events.len() <= limit {
                Vec::new()
            } else {
                let excess = state.events.len() - limit;
                let mut sorted: Vec<&AgentEvent> = state.events.iter().collect();
                sorted.sort_by_key(|e| e.timestamp);
                sorted
                    .into_iter()
                    .take(excess.min(batch_size))
                    .map(|e| e.id.as_str().to_string())
                    .collect()
            }
        };
        if to_delete.is_empty() {
            return Ok(0);
        }
        let deleted = to_delete.len();
        self.commit(StorageEvent::AgentEventsDeleted { ids: to_delete })?;
        Ok(deleted)
    }

    async fn count_events_by_type(&self) -> Result<HashMap<String, usize>, StoreError> {
        let state = self.state.lock();
        let mut counts = HashMap::new();
        for event in &state.events {
            *counts.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn compact(&self) -> Result<(), StoreError> {
        // The WAL has no secondary index to rebuild; nothing to do beyond
        // the deletes already committed.
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.state.lock().config.get(key).cloned())
    }

    async fn set_config(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.commit(StorageEvent::ConfigSet {
            key: key.to_string(),
            value,
        })
    }
}

impl FileStore {
    fn next_attempt_number(&self, issue_id: &IssueId) -> u32 {
        self.state
            .lock()
            .attempts
            .get(issue_id.as_str())
            .map(|a| a.len() as u32 + 1)
            .unwrap_or(1)
    }
}
