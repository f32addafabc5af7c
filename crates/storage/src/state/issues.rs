// SPDX-License-Identifier: MIT

//! Issue, comment, dependency, and label event handlers.

use super::MaterializedState;
use crate::event::StorageEvent;
use supervisor_core::{Issue, IssueComment, IssueStatus};

pub(crate) fn apply(state: &mut MaterializedState, event: &StorageEvent) {
    match event {
        StorageEvent::IssueCreated {
            id,
            title,
            description,
            priority,
            issue_type,
            created_at,
        } => {
            let key = id.as_str().to_string();
            if state.issues.contains_key(&key) {
                return;
            }
            let mut issue = Issue::new(id.clone(), title.clone(), *created_at);
            issue.description = description.clone();
            issue.priority = *priority;
            issue.issue_type = issue_type.clone();
            state.issues.insert(key, issue);
        }

        StorageEvent::IssueFieldsUpdated {
            id,
            description,
            design_notes,
            acceptance_criteria,
            priority,
            assignee,
            updated_at,
        } => {
            if let Some(issue) = state.issues.get_mut(id.as_str()) {
                if let Some(description) = description {
                    issue.description.clone_from(description);
                }
                if let Some(design_notes) = design_notes {
                    issue.design_notes.clone_from(design_notes);
                }
                if let Some(acceptance_criteria) = acceptance_criteria {
                    issue.acceptance_criteria.clone_from(acceptance_criteria);
                }
                if let Some(priority) = priority {
                    issue.priority = *priority;
                }
                if let Some(assignee) = assignee {
                    issue.assignee.clone_from(assignee);
                }
                issue.updated_at = *updated_at;
            }
        }

        StorageEvent::IssueStatusChanged {
            id,
            status,
            updated_at,
        } => {
            if let Some(issue) = state.issues.get_mut(id.as_str()) {
                issue.status = *status;
                issue.updated_at = *updated_at;
            }
        }

        StorageEvent::IssueClosed {
            id,
            reason,
            updated_at,
        } => {
            if let Some(issue) = state.issues.get_mut(id.as_str()) {
                issue.status = IssueStatus::Closed;
                issue.updated_at = *updated_at;
            }
            state.comments.entry(id.as_str().to_string()).or_default().push(IssueComment {
                issue_id: id.clone(),
                author: "system".to_string(),
                body: reason.clone(),
                created_at: *updated_at,
            });
        }

        StorageEvent::CommentAdded {
            issue_id,
            author,
            body,
            created_at,
        } => {
            state
                .comments
                .entry(issue_id.as_str().to_string())
                .or_default()
                .push(IssueComment {
                    issue_id: issue_id.clone(),
                    author: author.clone(),
                    body: body.clone(),
                    created_at: *created_at,
                });
        }

        StorageEvent::DependencyAdded {
            issue_id,
            depends_on,
        } => {
            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                if !issue.depends_on.contains(depends_on) {
                    issue.depends_on.push(depends_on.clone());
                }
            }
        }

        StorageEvent::DependencyRemoved {
            issue_id,
            depends_on,
        } => {
            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                issue.depends_on.retain(|d| d != depends_on);
            }
        }

        StorageEvent::LabelAdded { issue_id, label } => {
            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                if !issue.labels.contains(label) {
                    issue.labels.push(label.clone());
                }
            }
        }

        StorageEvent::LabelRemoved { issue_id, label } => {
            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                issue.labels.retain(|l| l != label);
            }
        }

        _ => {}
    }
}
