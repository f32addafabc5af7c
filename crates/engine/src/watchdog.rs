// SPDX-License-Identifier: MIT

//! The watchdog loop (§4.4, §5): polls telemetry, asks the anomaly oracle
//! about each active execution, and intervenes on threshold-crossing
//! anomalies. The oracle call runs on a throwaway task so a slow oracle
//! never blocks shutdown.

use crate::intervention::InterventionController;
use crate::telemetry::TelemetryMonitor;
use std::sync::Arc;
use supervisor_adapters::Oracle;
use supervisor_core::{Clock, EventSeverity, ExecutorId, IssueType, TelemetrySnapshot, WatchdogConfig};
use supervisor_storage::{NewIssue, TrackerStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct WatchdogDeps<St, C, O> {
    pub store: Arc<St>,
    pub clock: C,
    pub oracle: Arc<O>,
    pub telemetry: Arc<TelemetryMonitor>,
    pub intervention: Arc<InterventionController>,
    pub config: WatchdogConfig,
    pub executor_id: ExecutorId,
}

pub async fn run<St, C, O>(deps: Arc<WatchdogDeps<St, C, O>>, cancel: CancellationToken)
where
    St: TrackerStore,
    C: Clock,
    O: Oracle + 'static,
{
    info!("watchdog loop starting");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick(&deps, &cancel) => {}
        }

        if cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(deps.config.tick_interval) => {}
        }
    }
    info!("watchdog loop stopped");
}

async fn tick<St, C, O>(deps: &Arc<WatchdogDeps<St, C, O>>, cancel: &CancellationToken)
where
    St: TrackerStore,
    C: Clock,
    O: Oracle + 'static,
{
    let snapshots = deps.telemetry.snapshot_all(deps.clock.now());
    for snapshot in snapshots {
        if cancel.is_cancelled() {
            return;
        }
        check_one(deps, snapshot, cancel).await;
    }
}

async fn check_one<St, C, O>(
    deps: &Arc<WatchdogDeps<St, C, O>>,
    snapshot: TelemetrySnapshot,
    cancel: &CancellationToken,
) where
    St: TrackerStore,
    C: Clock,
    O: Oracle + 'static,
{
    let oracle = Arc::clone(&deps.oracle);
    let issue_id = snapshot.issue_id.clone();
    let handle = tokio::spawn(async move { oracle.check_anomaly(&snapshot).await });

    let anomaly = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = handle => match result {
            Ok(Ok(anomaly)) => anomaly,
            Ok(Err(e)) => {
                warn!(issue_id = %issue_id, error = %e, "anomaly oracle call failed");
                return;
            }
            Err(e) => {
                warn!(issue_id = %issue_id, error = %e, "anomaly oracle task panicked");
                return;
            }
        },
    };

    if anomaly.crosses_threshold(deps.config.min_confidence, deps.config.min_severity) {
        if deps.intervention.already_intervened(&issue_id, &anomaly.anomaly_type) {
            return;
        }

        let cancelled = deps
            .intervention
            .intervene(&issue_id, &anomaly.anomaly_type, anomaly.severity);
        info!(
            issue_id = %issue_id,
            anomaly_type = %anomaly.anomaly_type,
            severity = %anomaly.severity,
            cancelled,
            "watchdog intervened"
        );

        let now = deps.clock.now_utc();
        let title = format!("Watchdog escalation: {} on {}", anomaly.anomaly_type, issue_id);
        let description = format!(
            "{}\n\nLinked issue: {}\nRecommended action: {}",
            anomaly.rationale, issue_id, anomaly.recommended_action
        );
        if let Err(e) = deps
            .store
            .create_issue(
                NewIssue {
                    title,
                    description,
                    priority: anomaly.severity.escalation_priority(),
                    issue_type: IssueType::escalation(),
                    labels: vec!["watchdog".to_string()],
                    depends_on: Vec::new(),
                },
                now,
            )
            .await
        {
            warn!(issue_id = %issue_id, error = %e, "failed to file watchdog escalation issue");
        }
    } else if deps.config.log_below_threshold && anomaly.detected {
        let mut event = supervisor_core::AgentEvent::new(
            supervisor_core::AgentEventId::new(),
            deps.clock.now_utc(),
            deps.executor_id.clone(),
            "watchdog_alert",
            EventSeverity::Warning,
            anomaly.rationale.clone(),
        );
        event = event.with_issue(issue_id.clone());
        if let Err(e) = deps.store.store_event(event).await {
            warn!(issue_id = %issue_id, error = %e, "failed to persist watchdog_alert event");
        }
    }
}
