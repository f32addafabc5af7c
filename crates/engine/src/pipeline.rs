// SPDX-License-Identifier: MIT

//! The per-issue execution pipeline (§4.3): assess, sandbox, spawn, wait,
//! process results, teardown. Every failure this module observes is
//! translated into a store write before returning — nothing here propagates
//! an error back to the work loop, which only ever sees a claim released or
//! the issue advanced to `completed`/`failed`/`blocked`.

use crate::context;
use crate::dedup;
use crate::gates;
use crate::intervention::InterventionController;
use crate::sandbox_registry::SandboxRegistry;
use crate::telemetry::TelemetryMonitor;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use supervisor_adapters::{AgentProcess, AgentSpawnConfig, Oracle, SandboxManager};
use supervisor_core::{
    AgentEvent, AgentEventId, Clock, EventSeverity, ExecutionStatus, ExecutorId, Issue, IssueId,
    Sandbox, SandboxId, SandboxStatus, SupervisorConfig,
};
use supervisor_storage::TrackerStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything one execution of the pipeline needs. Bundled the way the
/// teacher bundles adapter dependencies, so `run` doesn't carry five
/// separate generic parameters at every call site.
pub struct PipelineDeps<St, C, O, Sm, Ag> {
    pub store: Arc<St>,
    pub clock: C,
    pub oracle: Arc<O>,
    pub sandbox_manager: Arc<Sm>,
    pub agent: Arc<Ag>,
    pub telemetry: Arc<TelemetryMonitor>,
    pub intervention: Arc<InterventionController>,
    pub sandbox_registry: Arc<SandboxRegistry>,
    pub executor_id: ExecutorId,
    pub config: SupervisorConfig,
}

async fn emit<St: TrackerStore>(
    store: &St,
    executor_id: &ExecutorId,
    issue_id: Option<IssueId>,
    event_type: &str,
    severity: EventSeverity,
    message: impl Into<String>,
    now: chrono::DateTime<Utc>,
) {
    let mut event = AgentEvent::new(
        AgentEventId::new(),
        now,
        executor_id.clone(),
        event_type,
        severity,
        message,
    );
    if let Some(id) = issue_id {
        event = event.with_issue(id);
    }
    if let Err(e) = store.store_event(event).await {
        warn!(error = %e, "failed to persist agent event");
    }
}

/// Run one claimed issue through the full pipeline. `cancel` is the
/// process-wide (or work-loop-wide) token; a detached token is used for the
/// cleanup writes that must land even if the ambient operation above them
/// was already cancelled.
pub async fn run<St, C, O, Sm, Ag>(deps: &PipelineDeps<St, C, O, Sm, Ag>, issue: Issue, cancel: CancellationToken)
where
    St: TrackerStore,
    C: Clock,
    O: Oracle,
    Sm: SandboxManager,
    Ag: AgentProcess,
{
    let issue_id = issue.id.clone();
    deps.telemetry.start(issue_id.clone(), deps.clock.now());

    if let Err(e) = deps
        .store
        .update_execution_state(&issue_id, ExecutionStatus::Assessing, None)
        .await
    {
        warn!(issue_id = %issue_id, error = %e, "failed to persist assessing state");
    }
    deps.telemetry.set_state(&issue_id, ExecutionStatus::Assessing);

    if cancel.is_cancelled() {
        cleanup_cancelled(deps, &issue_id, "assessment").await;
        return;
    }

    // §4.3 step 2: assessment. Entered unconditionally even when AI
    // supervision is disabled so the state machine's shape never changes
    // with configuration (spec.md §4.2, §9).
    if deps.config.enable_ai_supervision {
        match deps.oracle.assess(&issue).await {
            Ok(assessment) => {
                let body = format!(
                    "Assessment: {} (confidence {:.2}, effort: {})\nSteps: {}",
                    assessment.strategy,
                    assessment.confidence,
                    assessment.estimated_effort,
                    assessment.ordered_steps.join(" -> "),
                );
                if let Err(e) = deps
                    .store
                    .add_comment(&issue_id, "oracle", &body, deps.clock.now_utc())
                    .await
                {
                    warn!(issue_id = %issue_id, error = %e, "failed to record assessment comment");
                }
                emit(
                    &*deps.store,
                    &deps.executor_id,
                    Some(issue_id.clone()),
                    "assessment_completed",
                    EventSeverity::Info,
                    format!("strategy={}", assessment.strategy),
                    deps.clock.now_utc(),
                )
                .await;
            }
            Err(e) => {
                warn!(issue_id = %issue_id, error = %e, "assessment oracle call failed, continuing without it");
            }
        }
    }

    if cancel.is_cancelled() {
        cleanup_cancelled(deps, &issue_id, "assessment").await;
        return;
    }

    // §4.3 step 3: sandbox creation.
    let mut sandbox: Option<Sandbox> = None;
    let mut working_dir = deps.config.working_dir.clone();
    if deps.config.enable_sandboxes {
        let branch = supervisor_core::mission_branch(issue_id.as_str(), &issue.title);
        let path = deps.config.sandbox_root.join(issue_id.as_str());
        match deps
            .sandbox_manager
            .create(&path, &branch, Some(&deps.config.default_branch))
            .await
        {
            Ok(handle) => {
                let record = Sandbox::new(
                    SandboxId::new(),
                    issue_id.clone(),
                    handle.path.clone(),
                    handle.branch.clone(),
                    deps.config.default_branch.clone(),
                    deps.clock.now_utc(),
                );
                working_dir = handle.path;
                deps.sandbox_registry.record(record.clone());
                let _ = deps.sandbox_registry.persist().await;
                sandbox = Some(record);
            }
            Err(e) => {
                warn!(issue_id = %issue_id, error = %e, "sandbox creation failed, continuing in main workspace");
                emit(
                    &*deps.store,
                    &deps.executor_id,
                    Some(issue_id.clone()),
                    "sandbox_creation_failed",
                    EventSeverity::Warning,
                    e.to_string(),
                    deps.clock.now_utc(),
                )
                .await;
            }
        }
    }

    // §4.3 step 4: spawn.
    if let Err(e) = deps
        .store
        .update_execution_state(&issue_id, ExecutionStatus::Executing, None)
        .await
    {
        warn!(issue_id = %issue_id, error = %e, "failed to persist executing state");
    }
    deps.telemetry.set_state(&issue_id, ExecutionStatus::Executing);

    let context = match context::gather(&*deps.store, &issue).await {
        Ok(c) => c,
        Err(e) => {
            fail_issue(deps, &issue_id, &format!("context gathering failed: {e}")).await;
            teardown_sandbox(deps, sandbox.as_ref(), true).await;
            deps.intervention.clear(&issue_id);
            deps.telemetry.end(&issue_id);
            return;
        }
    };
    let prompt = context::build_prompt(&context);

    let child_token = cancel.child_token();
    deps.intervention.register(issue_id.clone(), child_token.clone());

    let attempt = match deps.store.start_attempt(&issue_id, deps.clock.now_utc()).await {
        Ok(a) => a,
        Err(e) => {
            warn!(issue_id = %issue_id, error = %e, "failed to record attempt start");
            fail_issue(deps, &issue_id, &format!("failed to record attempt: {e}")).await;
            teardown_sandbox(deps, sandbox.as_ref(), true).await;
            deps.intervention.clear(&issue_id);
            deps.telemetry.end(&issue_id);
            return;
        }
    };

    emit(
        &*deps.store,
        &deps.executor_id,
        Some(issue_id.clone()),
        "agent_spawned",
        EventSeverity::Info,
        "agent process starting",
        deps.clock.now_utc(),
    )
    .await;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let telemetry_for_progress = Arc::clone(&deps.telemetry);
    let progress_issue_id = issue_id.clone();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            telemetry_for_progress.record_event(&progress_issue_id, &event.event_type, Utc::now());
        }
    });

    let spawn_config = AgentSpawnConfig {
        binary: deps.config.working_dir.join(".agent-binary"),
        working_dir: working_dir.clone(),
        prompt,
        timeout: deps.config.agent_timeout,
        extra_args: Vec::new(),
    };

    let outcome = deps
        .agent
        .run(spawn_config, child_token.clone(), Some(progress_tx))
        .await;
    progress_task.abort();

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            warn!(issue_id = %issue_id, error = %e, "agent spawn/wait failed");
            let _ = deps
                .store
                .finish_attempt(&attempt.id, false, None, &e.to_string(), deps.clock.now_utc())
                .await;
            emit(
                &*deps.store,
                &deps.executor_id,
                Some(issue_id.clone()),
                "agent_failed",
                EventSeverity::Error,
                e.to_string(),
                deps.clock.now_utc(),
            )
            .await;
            release_or_block(deps, &issue_id, &e.to_string()).await;
            teardown_sandbox(deps, sandbox.as_ref(), true).await;
            deps.intervention.clear(&issue_id);
            deps.telemetry.end(&issue_id);
            return;
        }
    };

    if child_token.is_cancelled() {
        // Watchdog-initiated abort: the escalation issue was already filed
        // by the watchdog. Release and reopen here regardless of exit code.
        let _ = deps
            .store
            .finish_attempt(
                &attempt.id,
                false,
                outcome.exit_code,
                "cancelled by watchdog",
                deps.clock.now_utc(),
            )
            .await;
        release_reopen(deps, &issue_id, "cancelled by watchdog").await;
        teardown_sandbox(deps, sandbox.as_ref(), true).await;
        deps.intervention.clear(&issue_id);
        deps.telemetry.end(&issue_id);
        return;
    }

    // §4.3 step 6: results processing.
    if let Err(e) = deps
        .store
        .update_execution_state(&issue_id, ExecutionStatus::Analyzing, None)
        .await
    {
        warn!(issue_id = %issue_id, error = %e, "failed to persist analyzing state");
    }
    deps.telemetry.set_state(&issue_id, ExecutionStatus::Analyzing);

    for raw in &outcome.events {
        let mut data = HashMap::new();
        for (k, v) in &raw.data {
            data.insert(k.clone(), v.clone());
        }
        let event = AgentEvent::new(
            AgentEventId::new(),
            deps.clock.now_utc(),
            deps.executor_id.clone(),
            raw.event_type.clone(),
            raw.severity,
            raw.message.clone(),
        )
        .with_issue(issue_id.clone())
        .data(data)
        .source_line(Some(raw.source_line));
        if let Err(e) = deps.store.store_event(event).await {
            warn!(issue_id = %issue_id, error = %e, "failed to persist agent-stream event");
        }
    }

    if !outcome.discoveries.is_empty() {
        let candidates = outcome
            .discoveries
            .iter()
            .map(|d| supervisor_core::DedupCandidate {
                title: d.title.clone(),
                description: d.description.clone(),
            })
            .collect::<Vec<_>>();
        dedup::process(
            &*deps.store,
            &*deps.oracle,
            &deps.config.deduplication,
            &deps.clock,
            candidates,
        )
        .await;
    }

    let gate_results = if deps.config.enable_quality_gates {
        if let Err(e) = deps
            .store
            .update_execution_state(&issue_id, ExecutionStatus::Gates, None)
            .await
        {
            warn!(issue_id = %issue_id, error = %e, "failed to persist gates state");
        }
        deps.telemetry.set_state(&issue_id, ExecutionStatus::Gates);
        gates::run(&working_dir, &deps.config.quality_gate_commands).await
    } else {
        Vec::new()
    };

    let agent_succeeded = outcome.process_succeeded();
    let gates_passed = gates::all_passed(&gate_results);
    let succeeded = agent_succeeded && gates_passed;

    if succeeded {
        if let Err(e) = deps
            .store
            .update_execution_state(&issue_id, ExecutionStatus::Committing, None)
            .await
        {
            warn!(issue_id = %issue_id, error = %e, "failed to persist committing state");
        }
        deps.telemetry.set_state(&issue_id, ExecutionStatus::Committing);

        let _ = deps
            .store
            .finish_attempt(
                &attempt.id,
                true,
                outcome.exit_code,
                "completed successfully",
                deps.clock.now_utc(),
            )
            .await;
        if let Err(e) = deps
            .store
            .update_execution_state(&issue_id, ExecutionStatus::Completed, None)
            .await
        {
            warn!(issue_id = %issue_id, error = %e, "failed to persist completed state");
        }
        if let Err(e) = deps
            .store
            .close_issue(&issue_id, "resolved by agent", deps.clock.now_utc())
            .await
        {
            warn!(issue_id = %issue_id, error = %e, "failed to close resolved issue");
        }
        if let Err(e) = deps.store.release_claim(&issue_id).await {
            warn!(issue_id = %issue_id, error = %e, "failed to release claim on success");
        }
        emit(
            &*deps.store,
            &deps.executor_id,
            Some(issue_id.clone()),
            "results_processing_completed",
            EventSeverity::Info,
            "mission completed",
            deps.clock.now_utc(),
        )
        .await;
        emit(
            &*deps.store,
            &deps.executor_id,
            Some(issue_id.clone()),
            "agent_completed",
            EventSeverity::Info,
            format!("exit_code={:?}", outcome.exit_code),
            deps.clock.now_utc(),
        )
        .await;
    } else {
        let reason = if !agent_succeeded {
            format!("agent did not succeed (exit_code={:?})", outcome.exit_code)
        } else {
            "quality gates failed".to_string()
        };
        let _ = deps
            .store
            .finish_attempt(&attempt.id, false, outcome.exit_code, &reason, deps.clock.now_utc())
            .await;
        if let Err(e) = deps
            .store
            .update_execution_state(&issue_id, ExecutionStatus::Failed, Some(reason.clone()))
            .await
        {
            warn!(issue_id = %issue_id, error = %e, "failed to persist failed state");
        }
        emit(
            &*deps.store,
            &deps.executor_id,
            Some(issue_id.clone()),
            "results_processing_failed",
            EventSeverity::Error,
            reason.clone(),
            deps.clock.now_utc(),
        )
        .await;
        release_or_block(deps, &issue_id, &reason).await;
    }

    let preserve = !succeeded && deps.config.keep_sandbox_on_failure;
    teardown_sandbox(deps, sandbox.as_ref(), !preserve).await;
    deps.intervention.clear(&issue_id);
    deps.telemetry.end(&issue_id);

    info!(issue_id = %issue_id, succeeded, "pipeline finished");
}

/// Count trailing failed attempts and, at the consecutive-failure ceiling
/// (§7), block instead of reopening.
async fn release_or_block<St, C, O, Sm, Ag>(deps: &PipelineDeps<St, C, O, Sm, Ag>, issue_id: &IssueId, reason: &str)
where
    St: TrackerStore,
    C: Clock,
{
    let history = deps.store.get_execution_history(issue_id).await.unwrap_or_default();
    let mut consecutive_failures = 0u32;
    for attempt in history.iter().rev() {
        match attempt.success {
            Some(false) => consecutive_failures += 1,
            _ => break,
        }
    }

    if consecutive_failures >= deps.config.max_consecutive_failures {
        let summary = format!("{consecutive_failures} consecutive failures; last error: {reason}");
        if let Err(e) = deps
            .store
            .release_and_block(issue_id, &summary, deps.clock.now_utc())
            .await
        {
            warn!(issue_id = %issue_id, error = %e, "failed to release-and-block issue");
        }
    } else if let Err(e) = deps.store.release_and_reopen(issue_id, reason, deps.clock.now_utc()).await {
        warn!(issue_id = %issue_id, error = %e, "failed to release-and-reopen issue");
    }
}

async fn release_reopen<St, C, O, Sm, Ag>(deps: &PipelineDeps<St, C, O, Sm, Ag>, issue_id: &IssueId, reason: &str)
where
    St: TrackerStore,
    C: Clock,
{
    if let Err(e) = deps.store.release_and_reopen(issue_id, reason, deps.clock.now_utc()).await {
        warn!(issue_id = %issue_id, error = %e, "failed to release-and-reopen issue");
    }
}

async fn fail_issue<St, C, O, Sm, Ag>(deps: &PipelineDeps<St, C, O, Sm, Ag>, issue_id: &IssueId, reason: &str)
where
    St: TrackerStore,
    C: Clock,
{
    emit(
        &*deps.store,
        &deps.executor_id,
        Some(issue_id.clone()),
        "pipeline_error",
        EventSeverity::Error,
        reason,
        deps.clock.now_utc(),
    )
    .await;
    release_or_block(deps, issue_id, reason).await;
}

/// Shutdown mid-execution: cleanup writes must always land, so this never
/// takes the ambient (possibly-already-cancelled) token (§4.2, §5, §7).
async fn cleanup_cancelled<St, C, O, Sm, Ag>(deps: &PipelineDeps<St, C, O, Sm, Ag>, issue_id: &IssueId, stage: &str)
where
    St: TrackerStore,
    C: Clock,
{
    let reason = format!("cancelled during {stage}");
    release_reopen(deps, issue_id, &reason).await;
    emit(
        &*deps.store,
        &deps.executor_id,
        Some(issue_id.clone()),
        "pipeline_cancelled",
        EventSeverity::Warning,
        reason,
        deps.clock.now_utc(),
    )
    .await;
    deps.intervention.clear(issue_id);
    deps.telemetry.end(issue_id);
}

async fn teardown_sandbox<St, C, O, Sm, Ag>(deps: &PipelineDeps<St, C, O, Sm, Ag>, sandbox: Option<&Sandbox>, tear_down: bool)
where
    Sm: SandboxManager,
{
    let Some(sandbox) = sandbox else {
        return;
    };
    if tear_down {
        let handle = supervisor_adapters::SandboxHandle {
            path: sandbox.path.clone(),
            branch: sandbox.branch.clone(),
        };
        match deps.sandbox_manager.destroy(&handle).await {
            Ok(()) => deps.sandbox_registry.mark_status(&sandbox.id, SandboxStatus::TornDown),
            Err(e) => warn!(sandbox_id = %sandbox.id, error = %e, "sandbox teardown failed"),
        }
    } else {
        deps.sandbox_registry.mark_status(&sandbox.id, SandboxStatus::Preserved);
    }
    let _ = deps.sandbox_registry.persist().await;
}
