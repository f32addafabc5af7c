// SPDX-License-Identifier: MIT

//! Event-retention janitor (§4.6 "Event-retention janitor").

use std::sync::Arc;
use std::time::Instant;
use supervisor_core::{AgentEvent, AgentEventId, Clock, EventRetentionConfig, EventSeverity, ExecutorId};
use supervisor_storage::TrackerStore;
use tracing::{info, warn};

pub async fn run_cycle<St: TrackerStore, C: Clock>(
    store: &St,
    clock: &C,
    config: &EventRetentionConfig,
    executor_id: &ExecutorId,
) {
    if !config.enabled {
        return;
    }

    let started = Instant::now();
    let now = clock.now_utc();
    let mut deleted = 0usize;
    let mut success = true;

    let age_cutoff = now - chrono::Duration::days(config.retention_days as i64);
    let critical_cutoff = now - chrono::Duration::days(config.retention_critical_days as i64);
    match store
        .delete_events_older_than(age_cutoff, EventSeverity::Error, critical_cutoff, config.batch_size)
        .await
    {
        Ok(n) => deleted += n,
        Err(e) => {
            warn!(error = %e, "event-retention: age-based delete failed");
            success = false;
        }
    }

    match store
        .delete_events_over_per_issue_limit(config.per_issue_limit_events, config.batch_size)
        .await
    {
        Ok(n) => deleted += n,
        Err(e) => {
            warn!(error = %e, "event-retention: per-issue limit delete failed");
            success = false;
        }
    }

    let total_events: usize = match store.count_events_by_type().await {
        Ok(counts) => counts.values().sum(),
        Err(e) => {
            warn!(error = %e, "event-retention: failed to count events");
            success = false;
            0
        }
    };

    let global_threshold = (config.global_limit_events as f64 * 0.95) as usize;
    if total_events > global_threshold {
        match store
            .delete_events_over_global_limit(config.global_limit_events, config.batch_size)
            .await
        {
            Ok(n) => deleted += n,
            Err(e) => {
                warn!(error = %e, "event-retention: global limit delete failed");
                success = false;
            }
        }
    }

    let mut vacuum_ran = false;
    if config.cleanup_vacuum && deleted > 0 {
        match store.compact().await {
            Ok(()) => vacuum_ran = true,
            Err(e) => {
                warn!(error = %e, "event-retention: compaction failed");
                success = false;
            }
        }
    }

    let remaining: usize = store
        .count_events_by_type()
        .await
        .map(|counts| counts.values().sum())
        .unwrap_or(total_events.saturating_sub(deleted));

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(deleted, remaining, elapsed_ms, vacuum_ran, success, "event-retention cycle finished");

    let summary = AgentEvent::new(
        AgentEventId::new(),
        clock.now_utc(),
        executor_id.clone(),
        "event_retention_summary",
        if success { EventSeverity::Info } else { EventSeverity::Warning },
        format!(
            "deleted={deleted} remaining={remaining} elapsed_ms={elapsed_ms} vacuum_ran={vacuum_ran} success={success}"
        ),
    );
    if let Err(e) = store.store_event(summary).await {
        warn!(error = %e, "failed to persist event-retention summary event");
    }
}

pub async fn run<St: TrackerStore, C: Clock>(
    store: Arc<St>,
    clock: C,
    config: EventRetentionConfig,
    executor_id: ExecutorId,
    cancel: tokio_util::sync::CancellationToken,
) {
    let interval = std::time::Duration::from_secs(config.cleanup_interval_hours as u64 * 3600);
    info!("event-retention janitor starting");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = run_cycle(&*store, &clock, &config, &executor_id) => {}
        }
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!("event-retention janitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor_core::FakeClock;
    use supervisor_storage::FileStore;

    #[tokio::test]
    async fn disabled_config_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(&dir.path().join("wal.jsonl")).expect("open");
        let clock = FakeClock::new();
        let mut config = EventRetentionConfig::default();
        config.enabled = false;

        run_cycle(&store, &clock, &config, &ExecutorId::new()).await;

        let counts = store.count_events_by_type().await.expect("counts");
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn enabled_cycle_emits_a_summary_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(&dir.path().join("wal.jsonl")).expect("open");
        let clock = FakeClock::new();
        let config = EventRetentionConfig::default();

        run_cycle(&store, &clock, &config, &ExecutorId::new()).await;

        let counts = store.count_events_by_type().await.expect("counts");
        assert_eq!(counts.get("event_retention_summary").copied().unwrap_or(0), 1);
    }
}
