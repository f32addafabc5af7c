// SPDX-License-Identifier: MIT

//! The intervention controller: the watchdog's sole means of reaching into
//! another task's cancellation tree to abort one specific agent (§4.4, §9).
//!
//! The issue -> cancel-handle map is a weak reference by intent: its
//! lifetime is the agent invocation, and the pipeline clears its own entry
//! in a guaranteed-cleanup block so a stale entry can never cancel a future
//! agent that happens to reuse the same issue ID.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use supervisor_core::{AnomalySeverity, IssueId};
use tokio_util::sync::CancellationToken;

/// One past intervention, kept for damping repeated interventions on the
/// same signature (issue + anomaly type).
#[derive(Debug, Clone)]
pub struct InterventionRecord {
    pub issue_id: IssueId,
    pub anomaly_type: String,
    pub severity: AnomalySeverity,
}

/// Registered cancel handles for active executions, plus a bounded history
/// of past interventions.
pub struct InterventionController {
    handles: Mutex<HashMap<IssueId, CancellationToken>>,
    history: Mutex<VecDeque<InterventionRecord>>,
    max_history_size: usize,
}

impl InterventionController {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            max_history_size: max_history_size.max(1),
        }
    }

    /// Register the cancellation token the watchdog should invoke to abort
    /// this issue's agent. Replaces any prior entry for the same issue.
    pub fn register(&self, issue_id: IssueId, token: CancellationToken) {
        self.handles.lock().insert(issue_id, token);
    }

    /// Clear the entry for an issue. Always called on pipeline exit
    /// (success, failure, or cancellation) so no stale handle lingers.
    pub fn clear(&self, issue_id: &IssueId) {
        self.handles.lock().remove(issue_id);
    }

    /// Whether this issue already had an intervention recorded for the same
    /// anomaly type — used to damp repeated escalations on one signature
    /// while the agent is still winding down from the first.
    pub fn already_intervened(&self, issue_id: &IssueId, anomaly_type: &str) -> bool {
        self.history
            .lock()
            .iter()
            .any(|r| &r.issue_id == issue_id && r.anomaly_type == anomaly_type)
    }

    /// Invoke the registered cancel handle for `issue_id`, if any, and
    /// record the intervention. Returns `true` if a live handle was found
    /// and cancelled.
    pub fn intervene(&self, issue_id: &IssueId, anomaly_type: &str, severity: AnomalySeverity) -> bool {
        let cancelled = match self.handles.lock().get(issue_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        };

        let mut history = self.history.lock();
        if history.len() >= self.max_history_size {
            history.pop_front();
        }
        history.push_back(InterventionRecord {
            issue_id: issue_id.clone(),
            anomaly_type: anomaly_type.to_string(),
            severity,
        });

        cancelled
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}
