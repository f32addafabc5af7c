// SPDX-License-Identifier: MIT

//! End-to-end scenarios over the per-issue pipeline, the watchdog, and
//! deduplication, against a real `FileStore`, driven by `FakeClock`,
//! `FakeAgent`, and stub oracles so nothing here spawns a real subprocess
//! or depends on wall-clock timing beyond a couple of short real sleeps
//! used to let concurrently-spawned tasks reach a steady state.

use std::sync::Arc;
use std::time::Duration;

use supervisor_adapters::{FakeAgent, NullOracle, WorktreeSandboxManager};
use supervisor_core::{
    Anomaly, AnomalySeverity, Clock, DedupCandidate, DeduplicationConfig, ExecutorId, FakeClock,
    Issue, IssueId, IssuePriority, IssueStatus, IssueType,
};
use supervisor_engine::intervention::InterventionController;
use supervisor_engine::pipeline::{self, PipelineDeps};
use supervisor_engine::telemetry::TelemetryMonitor;
use supervisor_engine::{dedup, watchdog, SandboxRegistry, WatchdogDeps};
use supervisor_storage::{ClaimOutcome, FileStore, IssueFilter, NewIssue, ReadyWorkFilter, TrackerStore};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn base_config(root: &std::path::Path) -> supervisor_core::SupervisorConfig {
    let mut config = supervisor_core::SupervisorConfig {
        enable_sandboxes: false,
        enable_quality_gates: false,
        enable_ai_supervision: false,
        working_dir: root.to_path_buf(),
        ..supervisor_core::SupervisorConfig::default()
    };
    config.quality_gate_commands.clear();
    config
}

/// Build one `PipelineDeps` bundle. Every scenario wires the same shape of
/// dependencies; only the agent, oracle, and shared telemetry/intervention
/// (when two pipelines must share them) differ.
#[allow(clippy::too_many_arguments)]
async fn make_deps<O, Ag>(
    store: &Arc<FileStore>,
    clock: &FakeClock,
    oracle: Arc<O>,
    agent: Arc<Ag>,
    telemetry: Arc<TelemetryMonitor>,
    intervention: Arc<InterventionController>,
    config: &supervisor_core::SupervisorConfig,
) -> Arc<PipelineDeps<FileStore, FakeClock, O, WorktreeSandboxManager, Ag>> {
    let sandbox_registry = Arc::new(
        SandboxRegistry::open(&config.sandbox_root)
            .await
            .expect("open sandbox registry"),
    );
    Arc::new(PipelineDeps {
        store: Arc::clone(store),
        clock: clock.clone(),
        oracle,
        sandbox_manager: Arc::new(WorktreeSandboxManager::new(config.parent_repo.clone())),
        agent,
        telemetry,
        intervention,
        sandbox_registry,
        executor_id: ExecutorId::new(),
        config: config.clone(),
    })
}

/// Mirrors the work loop's claim + `issue_claimed` event (§4.2) so pipeline
/// scenarios that call `pipeline::run` directly still exercise the same
/// store preconditions the real work loop establishes.
async fn claim_for_test(store: &FileStore, issue: &Issue, executor_id: &ExecutorId, now: chrono::DateTime<chrono::Utc>) {
    let outcome = store
        .claim_issue(&issue.id, executor_id, now)
        .await
        .expect("claim");
    assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
    let event = supervisor_core::AgentEvent::new(
        supervisor_core::AgentEventId::new(),
        now,
        executor_id.clone(),
        "issue_claimed",
        supervisor_core::EventSeverity::Info,
        "claimed for test",
    )
    .with_issue(issue.id.clone());
    store.store_event(event).await.expect("store issue_claimed event");
}

#[tokio::test]
async fn happy_path_single_executor_ai_disabled() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(&dir.path().join("wal.jsonl")).expect("open store"));
    let clock = FakeClock::new();
    let config = base_config(dir.path());

    let issue = store
        .create_issue(
            NewIssue {
                title: "Add retry to fetch".to_string(),
                description: "retry flaky network calls".to_string(),
                priority: IssuePriority(2),
                issue_type: IssueType::task(),
                labels: Vec::new(),
                depends_on: Vec::new(),
            },
            clock.now_utc(),
        )
        .await
        .expect("create issue");

    let executor_id = ExecutorId::new();
    claim_for_test(&store, &issue, &executor_id, clock.now_utc()).await;

    let agent = Arc::new(FakeAgent::new(
        vec![r#"{"type":"terminal","message":"done"}"#.to_string()],
        Some(0),
    ));
    let deps = make_deps(
        &store,
        &clock,
        Arc::new(NullOracle),
        agent,
        Arc::new(TelemetryMonitor::new()),
        Arc::new(InterventionController::new(config.watchdog.max_history_size)),
        &config,
    )
    .await;

    pipeline::run(&deps, issue.clone(), CancellationToken::new()).await;

    let finished = store.get_issue(&issue.id).await.expect("get").expect("present");
    assert_eq!(finished.status, IssueStatus::Closed);

    let history = store.get_execution_history(&issue.id).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].success, Some(true));

    let events = store.events_for_issue(&issue.id).await.expect("events");
    let event_types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(event_types.contains(&"issue_claimed"));
    assert!(event_types.contains(&"agent_spawned"));
    assert!(event_types.contains(&"agent_completed"));
    assert!(event_types.contains(&"results_processing_completed"));
}

#[tokio::test]
async fn dependency_gate_blocks_ready_work_until_dependency_closes() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(&dir.path().join("wal.jsonl")).expect("open store"));
    let now = chrono::Utc::now();

    let x0 = store
        .create_issue(NewIssue { title: "X0".to_string(), ..Default::default() }, now)
        .await
        .expect("create x0");
    let x1 = store
        .create_issue(
            NewIssue {
                title: "X1".to_string(),
                depends_on: vec![x0.id.clone()],
                ..Default::default()
            },
            now,
        )
        .await
        .expect("create x1");

    let ready = store.ready_work(ReadyWorkFilter::default()).await.expect("ready work");
    assert!(ready.iter().all(|i| i.id != x1.id), "X1 must not be ready while X0 is open");

    store.close_issue(&x0.id, "done", now).await.expect("close x0");

    let ready = store
        .ready_work(ReadyWorkFilter::default())
        .await
        .expect("ready work after close");
    assert!(ready.iter().any(|i| i.id == x1.id), "X1 must become ready once X0 closes");
}

#[tokio::test]
async fn consecutive_failures_block_instead_of_reopening() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(&dir.path().join("wal.jsonl")).expect("open store"));
    let clock = FakeClock::new();
    let mut config = base_config(dir.path());
    config.max_consecutive_failures = 3;

    let issue = store
        .create_issue(NewIssue { title: "flaky mission".to_string(), ..Default::default() }, clock.now_utc())
        .await
        .expect("create issue");

    let failing_agent = Arc::new(FakeAgent::new(Vec::new(), Some(1)));
    let oracle = Arc::new(NullOracle);

    for attempt in 0..3 {
        let current = store.get_issue(&issue.id).await.expect("get").expect("present");
        assert_eq!(current.status, IssueStatus::Open, "issue must be open before each reclaim");
        let executor_id = ExecutorId::new();
        claim_for_test(&store, &current, &executor_id, clock.now_utc()).await;

        let deps = make_deps(
            &store,
            &clock,
            Arc::clone(&oracle),
            Arc::clone(&failing_agent),
            Arc::new(TelemetryMonitor::new()),
            Arc::new(InterventionController::new(config.watchdog.max_history_size)),
            &config,
        )
        .await;

        pipeline::run(&deps, current, CancellationToken::new()).await;
        clock.advance(Duration::from_secs(1));

        let after = store.get_issue(&issue.id).await.expect("get").expect("present");
        if attempt < 2 {
            assert_eq!(after.status, IssueStatus::Open, "attempt {attempt} should reopen, not block");
        } else {
            assert_eq!(after.status, IssueStatus::Blocked, "third consecutive failure must block");
        }
    }

    let comments = store.get_comments(&issue.id).await.expect("comments");
    assert!(
        comments.iter().any(|c| c.body.contains("3 consecutive")),
        "blocking comment must cite the consecutive-failure count"
    );

    let history = store.get_execution_history(&issue.id).await.expect("history");
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|a| a.success == Some(false)));
}

#[tokio::test]
async fn watchdog_cancels_only_the_anomalous_execution() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(&dir.path().join("wal.jsonl")).expect("open store"));
    let clock = FakeClock::new();
    let mut config = base_config(dir.path());
    config.watchdog.tick_interval = Duration::from_millis(5);
    config.watchdog.min_confidence = 0.8;
    config.watchdog.min_severity = AnomalySeverity::Medium;

    let anomalous = store
        .create_issue(NewIssue { title: "stuck mission".to_string(), ..Default::default() }, clock.now_utc())
        .await
        .expect("create anomalous");
    let healthy = store
        .create_issue(NewIssue { title: "healthy mission".to_string(), ..Default::default() }, clock.now_utc())
        .await
        .expect("create healthy");

    let executor_id = ExecutorId::new();
    claim_for_test(&store, &anomalous, &executor_id, clock.now_utc()).await;
    claim_for_test(&store, &healthy, &executor_id, clock.now_utc()).await;

    let telemetry = Arc::new(TelemetryMonitor::new());
    let intervention = Arc::new(InterventionController::new(config.watchdog.max_history_size));

    let hanging_agent = Arc::new(FakeAgent::hanging());
    let healthy_agent = Arc::new(FakeAgent::new(
        vec![r#"{"type":"terminal","message":"done"}"#.to_string()],
        Some(0),
    ));

    // The watchdog's oracle must only flag the anomalous issue — a blanket
    // "always anomalous" stub would abort the healthy run too as soon as its
    // telemetry is sampled, since both executions share one watchdog tick.
    let watchdog_oracle = Arc::new(TargetedAnomalyOracle { target: anomalous.id.clone() });

    let anomalous_deps = make_deps(
        &store,
        &clock,
        Arc::new(NullOracle),
        hanging_agent,
        Arc::clone(&telemetry),
        Arc::clone(&intervention),
        &config,
    )
    .await;
    let healthy_deps = make_deps(
        &store,
        &clock,
        Arc::new(NullOracle),
        healthy_agent,
        Arc::clone(&telemetry),
        Arc::clone(&intervention),
        &config,
    )
    .await;

    let anomalous_id = anomalous.id.clone();
    let anomalous_run = tokio::spawn(async move {
        pipeline::run(&anomalous_deps, anomalous, CancellationToken::new()).await;
    });

    // Give the anomalous pipeline a moment to register with telemetry and
    // the intervention controller before the watchdog's first tick.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let watchdog_deps = Arc::new(WatchdogDeps {
        store: Arc::clone(&store),
        clock: clock.clone(),
        oracle: watchdog_oracle,
        telemetry: Arc::clone(&telemetry),
        intervention: Arc::clone(&intervention),
        config: config.watchdog.clone(),
        executor_id: executor_id.clone(),
    });
    let watchdog_cancel = CancellationToken::new();
    let watchdog_handle = tokio::spawn(watchdog::run(watchdog_deps, watchdog_cancel.clone()));

    // The watchdog oracle only flags `anomalous.id`'s snapshot, so starting
    // the healthy run now (while the watchdog is already ticking) exercises
    // the real race instead of sequencing around it.
    let healthy_run = tokio::spawn(async move {
        pipeline::run(&healthy_deps, healthy, CancellationToken::new()).await;
    });

    anomalous_run.await.expect("anomalous pipeline task");
    healthy_run.await.expect("healthy pipeline task");

    watchdog_cancel.cancel();
    watchdog_handle.await.expect("watchdog task");

    let anomalous_final = store.get_issue(&anomalous_id).await.expect("get").expect("present");
    assert_eq!(anomalous_final.status, IssueStatus::Open, "aborted mission must be reopened");

    let healthy_final = store
        .search_issues(IssueFilter::default())
        .await
        .expect("search")
        .into_iter()
        .find(|i| i.title == "healthy mission")
        .expect("healthy issue present");
    assert_eq!(healthy_final.status, IssueStatus::Closed, "unrelated mission must complete normally");

    let escalations: Vec<Issue> = store
        .search_issues(IssueFilter::default())
        .await
        .expect("search")
        .into_iter()
        .filter(|i| i.issue_type == IssueType::escalation())
        .collect();
    assert_eq!(escalations.len(), 1, "exactly one escalation issue must be filed");
    assert!(escalations[0].description.contains(anomalous_id.as_str()));
}

#[tokio::test]
async fn dedup_within_batch_suppresses_duplicate_of_earlier_candidate() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(&dir.path().join("wal.jsonl")).expect("open store"));
    let clock = FakeClock::new();
    let config = DeduplicationConfig {
        within_batch: true,
        confidence_threshold: 0.85,
        min_title_length: 3,
        ..DeduplicationConfig::default()
    };

    let candidates = vec![
        DedupCandidate {
            title: "Login 500".to_string(),
            description: "login endpoint returns 500".to_string(),
        },
        DedupCandidate {
            title: "Login 500 again".to_string(),
            description: "same 500 on login".to_string(),
        },
        DedupCandidate {
            title: "Disk full".to_string(),
            description: "worker disk at 100%".to_string(),
        },
    ];

    let oracle = WithinBatchOracle;
    dedup::process(&*store, &oracle, &config, &clock, candidates).await;

    let filed = store.search_issues(IssueFilter::default()).await.expect("search");
    assert_eq!(filed.len(), 2, "exactly two issues should be filed: first Login 500 and Disk full");
    assert!(filed.iter().any(|i| i.title == "Login 500"));
    assert!(filed.iter().any(|i| i.title == "Disk full"));
    assert!(!filed.iter().any(|i| i.title == "Login 500 again"));
}

/// Flags only the one issue named by `target` as anomalous; every other
/// snapshot comes back clean. Used to prove the watchdog's intervention is
/// scoped to the execution that actually triggered it.
struct TargetedAnomalyOracle {
    target: IssueId,
}

#[async_trait::async_trait]
impl supervisor_adapters::Oracle for TargetedAnomalyOracle {
    async fn assess(
        &self,
        _issue: &Issue,
    ) -> Result<supervisor_core::Assessment, supervisor_adapters::OracleError> {
        unreachable!("not exercised by this scenario")
    }

    async fn check_anomaly(
        &self,
        snapshot: &supervisor_core::TelemetrySnapshot,
    ) -> Result<Anomaly, supervisor_adapters::OracleError> {
        if snapshot.issue_id == self.target {
            Ok(Anomaly {
                detected: true,
                anomaly_type: "stuck_loop".to_string(),
                severity: AnomalySeverity::High,
                confidence: 0.95,
                recommended_action: "abort".to_string(),
                rationale: "no progress in 10 minutes".to_string(),
            })
        } else {
            Ok(Anomaly::none())
        }
    }

    async fn deduplicate(
        &self,
        _candidates: &[DedupCandidate],
        _existing: &[Issue],
    ) -> Result<Vec<supervisor_core::DedupVerdict>, supervisor_adapters::OracleError> {
        unreachable!("not exercised by this scenario")
    }
}

/// Flags any candidate whose title starts with "Login" a duplicate of
/// whatever already-accepted candidate/issue precedes it, leaves every
/// other candidate alone. Good enough to drive the within-batch suppression
/// path without modeling full semantic comparison.
struct WithinBatchOracle;

#[async_trait::async_trait]
impl supervisor_adapters::Oracle for WithinBatchOracle {
    async fn assess(
        &self,
        _issue: &Issue,
    ) -> Result<supervisor_core::Assessment, supervisor_adapters::OracleError> {
        unreachable!("not exercised by this scenario")
    }

    async fn check_anomaly(
        &self,
        _snapshot: &supervisor_core::TelemetrySnapshot,
    ) -> Result<Anomaly, supervisor_adapters::OracleError> {
        unreachable!("not exercised by this scenario")
    }

    async fn deduplicate(
        &self,
        candidates: &[DedupCandidate],
        existing: &[Issue],
    ) -> Result<Vec<supervisor_core::DedupVerdict>, supervisor_adapters::OracleError> {
        let verdicts = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let duplicate_of = if candidate.title.starts_with("Login") && !existing.is_empty() {
                    existing
                        .iter()
                        .find(|e| e.title.starts_with("Login"))
                        .map(|e| e.id.clone())
                } else {
                    None
                };
                let confidence = if duplicate_of.is_some() { 0.95 } else { 0.0 };
                supervisor_core::DedupVerdict { candidate_index: index, duplicate_of, confidence }
            })
            .collect();
        Ok(verdicts)
    }
}
