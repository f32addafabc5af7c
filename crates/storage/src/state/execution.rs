// SPDX-License-Identifier: MIT

//! Claim / execution-state-machine and attempt-history event handlers.

use super::MaterializedState;
use crate::event::StorageEvent;
use supervisor_core::{ExecutionAttempt, ExecutionState, ExecutionStatus, IssueStatus};

pub(crate) fn apply(state: &mut MaterializedState, event: &StorageEvent) {
    match event {
        StorageEvent::ClaimAcquired {
            issue_id,
            executor_id,
            claimed_at,
        } => {
            let entry = state
                .execution_states
                .entry(issue_id.as_str().to_string())
                .or_insert_with(|| ExecutionState::pending(issue_id.clone()));
            entry.executor_instance_id = Some(executor_id.clone());
            entry.claimed_at = Some(*claimed_at);
            entry.state = ExecutionStatus::Claimed;
            entry.error_message = None;

            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                issue.status = IssueStatus::InProgress;
            }
        }

        StorageEvent::ExecutionStateChanged {
            issue_id,
            state: new_state,
            error_message,
        } => {
            if let Some(entry) = state.execution_states.get_mut(issue_id.as_str()) {
                entry.state = *new_state;
                if error_message.is_some() {
                    entry.error_message.clone_from(error_message);
                }
            }
        }

        StorageEvent::CheckpointSaved {
            issue_id,
            checkpoint_data,
        } => {
            if let Some(entry) = state.execution_states.get_mut(issue_id.as_str()) {
                entry.checkpoint_data = Some(checkpoint_data.clone());
            }
        }

        StorageEvent::ClaimReleased { issue_id } => {
            if let Some(entry) = state.execution_states.get_mut(issue_id.as_str()) {
                entry.executor_instance_id = None;
                entry.claimed_at = None;
            }
        }

        StorageEvent::ClaimReleasedAndReopened {
            issue_id,
            error_message,
            at: _,
        } => {
            if let Some(entry) = state.execution_states.get_mut(issue_id.as_str()) {
                entry.executor_instance_id = None;
                entry.claimed_at = None;
                entry.state = ExecutionStatus::Pending;
                entry.error_message = Some(error_message.clone());
            }
            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                issue.status = IssueStatus::Open;
            }
        }

        StorageEvent::ClaimReleasedAndBlocked {
            issue_id,
            reason,
            at: _,
        } => {
            if let Some(entry) = state.execution_states.get_mut(issue_id.as_str()) {
                entry.executor_instance_id = None;
                entry.claimed_at = None;
                entry.state = ExecutionStatus::Failed;
                entry.error_message = Some(reason.clone());
            }
            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                issue.status = IssueStatus::Blocked;
            }
        }

        StorageEvent::AttemptStarted {
            id,
            issue_id,
            attempt_number,
            started_at,
        } => {
            state
                .attempts
                .entry(issue_id.as_str().to_string())
                .or_default()
                .push(ExecutionAttempt::start(
                    id.clone(),
                    issue_id.clone(),
                    *attempt_number,
                    *started_at,
                ));
        }

        StorageEvent::AttemptFinished {
            id,
            completed_at,
            success,
            exit_code,
            summary,
        } => {
            for attempts in state.attempts.values_mut() {
                if let Some(attempt) = attempts.iter_mut().find(|a| &a.id == id) {
                    attempt.completed_at = Some(*completed_at);
                    attempt.success = Some(*success);
                    attempt.exit_code = *exit_code;
                    attempt.summary.clone_from(summary);
                    break;
                }
            }
        }

        _ => {}
    }
}
