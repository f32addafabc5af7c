// SPDX-License-Identifier: MIT

//! The work loop (§4.2, §5): polls for ready work, claims it atomically,
//! and drives the claimed issue through the execution pipeline. One of the
//! four long-lived tasks `Supervisor::start` spawns.

use crate::pipeline::{self, PipelineDeps};
use std::sync::Arc;
use supervisor_adapters::{AgentProcess, Oracle, SandboxManager};
use supervisor_core::{AgentEvent, AgentEventId, Clock, EventSeverity, ExecutorId};
use supervisor_storage::{ClaimOutcome, ReadyWorkFilter, TrackerStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the poll-claim-execute cycle until `cancel` fires. Every tick is a
/// suspension point so shutdown is timely even between issues (§5).
pub async fn run<St, C, O, Sm, Ag>(
    deps: Arc<PipelineDeps<St, C, O, Sm, Ag>>,
    executor_id: ExecutorId,
    poll_interval: std::time::Duration,
    cancel: CancellationToken,
) where
    St: TrackerStore,
    C: Clock,
    O: Oracle,
    Sm: SandboxManager,
    Ag: AgentProcess,
{
    info!("work loop starting");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick(&deps, &executor_id, &cancel) => {}
        }

        if cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    info!("work loop stopped");
}

async fn tick<St, C, O, Sm, Ag>(
    deps: &Arc<PipelineDeps<St, C, O, Sm, Ag>>,
    executor_id: &ExecutorId,
    cancel: &CancellationToken,
) where
    St: TrackerStore,
    C: Clock,
    O: Oracle,
    Sm: SandboxManager,
    Ag: AgentProcess,
{
    if let Err(e) = crate::instance::heartbeat(&*deps.store, &deps.clock, executor_id).await {
        warn!(error = %e, "failed to update heartbeat");
    }

    let ready = match deps
        .store
        .ready_work(ReadyWorkFilter {
            limit: Some(1),
            label: None,
        })
        .await
    {
        Ok(issues) => issues,
        Err(e) => {
            warn!(error = %e, "failed to query ready work, retrying next tick");
            return;
        }
    };

    let Some(issue) = ready.into_iter().next() else {
        return;
    };

    let outcome = match deps
        .store
        .claim_issue(&issue.id, executor_id, deps.clock.now_utc())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(issue_id = %issue.id, error = %e, "failed to claim issue, retrying next tick");
            return;
        }
    };

    match outcome {
        ClaimOutcome::RaceLost => {
            info!(issue_id = %issue.id, "claim race lost, another executor took it");
        }
        ClaimOutcome::Claimed(_) => {
            info!(issue_id = %issue.id, "claimed issue");
            let event = AgentEvent::new(
                AgentEventId::new(),
                deps.clock.now_utc(),
                executor_id.clone(),
                "issue_claimed",
                EventSeverity::Info,
                format!("claimed by {executor_id}"),
            )
            .with_issue(issue.id.clone());
            if let Err(e) = deps.store.store_event(event).await {
                warn!(issue_id = %issue.id, error = %e, "failed to persist issue_claimed event");
            }
            pipeline::run(deps, issue, cancel.child_token()).await;
        }
    }
}
