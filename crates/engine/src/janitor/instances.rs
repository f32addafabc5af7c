// SPDX-License-Identifier: MIT

//! Stale-instance janitor (§4.1, §4.6 "Stale-instance janitor"): repeats the
//! reclamation sweep, prunes failed sandboxes beyond retention, and deletes
//! old stopped-instance rows.

use crate::sandbox_registry::SandboxRegistry;
use std::sync::Arc;
use supervisor_adapters::{SandboxHandle, SandboxManager};
use supervisor_core::{Clock, SupervisorConfig};
use supervisor_storage::TrackerStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run_cycle<St, C, Sm>(
    store: &St,
    clock: &C,
    sandbox_manager: &Sm,
    sandbox_registry: &SandboxRegistry,
    config: &SupervisorConfig,
) where
    St: TrackerStore,
    C: Clock,
    Sm: SandboxManager,
{
    match crate::instance::reclaim_stale(store, clock, config.stale_threshold).await {
        Ok(reclaimed) if reclaimed > 0 => info!(reclaimed, "janitor reclaimed stale instances"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "stale-instance reclamation sweep failed"),
    }

    for sandbox in sandbox_registry.prune_candidates(config.sandbox_retention_count as usize) {
        let handle = SandboxHandle {
            path: sandbox.path.clone(),
            branch: sandbox.branch.clone(),
        };
        match sandbox_manager.destroy(&handle).await {
            Ok(()) => {
                sandbox_registry.remove(&sandbox.id);
                info!(sandbox_id = %sandbox.id, "pruned sandbox beyond retention count");
            }
            Err(e) => warn!(sandbox_id = %sandbox.id, error = %e, "failed to prune sandbox"),
        }
    }
    if let Err(e) = sandbox_registry.persist().await {
        warn!(error = %e, "failed to persist sandbox registry after pruning");
    }

    match store
        .delete_old_stopped_instances(
            chrono::Duration::from_std(config.instance_cleanup_age).unwrap_or(chrono::Duration::zero()),
            config.instance_cleanup_keep,
            clock.now_utc(),
        )
        .await
    {
        Ok(deleted) if deleted > 0 => info!(deleted, "deleted old stopped instances"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to delete old stopped instances"),
    }
}

pub async fn run<St, C, Sm>(
    store: Arc<St>,
    clock: C,
    sandbox_manager: Arc<Sm>,
    sandbox_registry: Arc<SandboxRegistry>,
    config: SupervisorConfig,
    cancel: CancellationToken,
) where
    St: TrackerStore,
    C: Clock,
    Sm: SandboxManager,
{
    info!("stale-instance janitor starting");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = run_cycle(&*store, &clock, &*sandbox_manager, &sandbox_registry, &config) => {}
        }
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.cleanup_interval) => {}
        }
    }
    info!("stale-instance janitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor_adapters::WorktreeSandboxManager;
    use supervisor_core::{FakeClock, InstanceStatus};
    use supervisor_storage::{NewIssue, TrackerStore};

    #[tokio::test]
    async fn run_cycle_reclaims_stale_peers_and_releases_their_claims() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = supervisor_storage::FileStore::open(&dir.path().join("wal.jsonl")).expect("open store");
        let clock = FakeClock::new();
        let sandbox_root = dir.path().join("sandboxes");
        let sandbox_registry = SandboxRegistry::open(&sandbox_root).await.expect("open registry");
        let sandbox_manager = WorktreeSandboxManager::new(dir.path().to_path_buf());

        let mut config = SupervisorConfig {
            working_dir: dir.path().to_path_buf(),
            sandbox_root,
            stale_threshold: std::time::Duration::from_secs(60),
            ..SupervisorConfig::default()
        };
        config.instance_cleanup_age = std::time::Duration::from_secs(0);
        config.instance_cleanup_keep = 0;

        let peer = store
            .register_instance("peer-host", 999, "0.1.0", clock.now_utc())
            .await
            .expect("register peer");
        let issue = store
            .create_issue(NewIssue { title: "orphaned by dead peer".to_string(), ..Default::default() }, clock.now_utc())
            .await
            .expect("create issue");
        store
            .claim_issue(&issue.id, &peer.id, clock.now_utc())
            .await
            .expect("claim");

        clock.advance(std::time::Duration::from_secs(120));

        run_cycle(&store, &clock, &sandbox_manager, &sandbox_registry, &config).await;

        let instances = store.list_active_instances().await.expect("list instances");
        assert!(
            instances.iter().all(|i| i.id != peer.id),
            "stale peer must no longer be listed as running"
        );

        let reopened = store.get_issue(&issue.id).await.expect("get").expect("present");
        assert_eq!(reopened.status, supervisor_core::IssueStatus::Open, "orphaned claim must be released");

        store.mark_instance_stopped(&peer.id, clock.now_utc()).await.expect("mark stopped");
        clock.advance(std::time::Duration::from_secs(60));
        run_cycle(&store, &clock, &sandbox_manager, &sandbox_registry, &config).await;

        let stopped_still_present = store
            .list_active_instances()
            .await
            .expect("list instances")
            .iter()
            .any(|i| i.id == peer.id && i.status == InstanceStatus::Running);
        assert!(!stopped_still_present);
    }
}
