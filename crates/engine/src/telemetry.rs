// SPDX-License-Identifier: MIT

//! In-process telemetry for active executions (§4.3 step 1, §4.4 step 1).
//!
//! One entry per issue currently owned by this process, updated as the
//! pipeline advances and as agent events stream in. The watchdog reads a
//! snapshot of this map every tick; nothing here is persisted.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use supervisor_core::{ExecutionStatus, IssueId, TelemetrySnapshot};

struct Entry {
    state: ExecutionStatus,
    started: Instant,
    event_counts: HashMap<String, usize>,
    last_progress_at: Option<DateTime<Utc>>,
}

/// Tracks telemetry for every execution this process currently owns.
#[derive(Default)]
pub struct TelemetryMonitor {
    entries: Mutex<HashMap<IssueId, Entry>>,
}

impl TelemetryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh descriptor for a newly claimed issue.
    pub fn start(&self, issue_id: IssueId, clock_now: Instant) {
        self.entries.lock().insert(
            issue_id,
            Entry {
                state: ExecutionStatus::Claimed,
                started: clock_now,
                event_counts: HashMap::new(),
                last_progress_at: None,
            },
        );
    }

    /// Record a state-machine transition for telemetry purposes.
    pub fn set_state(&self, issue_id: &IssueId, state: ExecutionStatus) {
        if let Some(entry) = self.entries.lock().get_mut(issue_id) {
            entry.state = state;
        }
    }

    /// Record one observed agent event, bumping its type counter and
    /// (unless it's a no-op heartbeat line) the last-progress timestamp.
    pub fn record_event(&self, issue_id: &IssueId, event_type: &str, now: DateTime<Utc>) {
        if let Some(entry) = self.entries.lock().get_mut(issue_id) {
            *entry.event_counts.entry(event_type.to_string()).or_insert(0) += 1;
            entry.last_progress_at = Some(now);
        }
    }

    /// Drop the descriptor for an issue whose execution has ended.
    pub fn end(&self, issue_id: &IssueId) {
        self.entries.lock().remove(issue_id);
    }

    /// Snapshot every active execution for the watchdog's anomaly check.
    pub fn snapshot_all(&self, clock_now: Instant) -> Vec<TelemetrySnapshot> {
        self.entries
            .lock()
            .iter()
            .map(|(issue_id, entry)| TelemetrySnapshot {
                issue_id: issue_id.clone(),
                state: entry.state,
                elapsed_secs: clock_now.saturating_duration_since(entry.started).as_secs(),
                event_counts: entry.event_counts.clone(),
                last_progress_at: entry.last_progress_at,
            })
            .collect()
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.entries.lock().len()
    }
}
