// SPDX-License-Identifier: MIT

//! Agent events: the append-only structured log.

use crate::{AgentEventId, ExecutorId, IssueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity of an agent event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

crate::simple_display! {
    EventSeverity {
        Info => "info",
        Warning => "warning",
        Error => "error",
    }
}

/// One row in the append-only agent-event log.
///
/// `issue_id` is nullable: system-wide events (janitor summaries, instance
/// lifecycle) carry `None` rather than a sentinel pseudo-issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: AgentEventId,
    pub timestamp: DateTime<Utc>,
    pub issue_id: Option<IssueId>,
    pub executor_id: ExecutorId,
    pub agent_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: EventSeverity,
    pub message: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    /// Line number in the agent's stdout stream this event was parsed from,
    /// if the event originated from subprocess telemetry.
    #[serde(default)]
    pub source_line: Option<u64>,
}

impl AgentEvent {
    pub fn new(
        id: AgentEventId,
        now: DateTime<Utc>,
        executor_id: ExecutorId,
        event_type: impl Into<String>,
        severity: EventSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            timestamp: now,
            issue_id: None,
            executor_id,
            agent_id: None,
            event_type: event_type.into(),
            severity,
            message: message.into(),
            data: HashMap::new(),
            source_line: None,
        }
    }

    crate::setters! {
        option {
            agent_id: String,
        }
        set {
            issue_id: Option<IssueId>,
            data: HashMap<String, serde_json::Value>,
            source_line: Option<u64>,
        }
    }

    pub fn with_issue(mut self, issue_id: IssueId) -> Self {
        self.issue_id = Some(issue_id);
        self
    }
}
