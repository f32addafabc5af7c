// SPDX-License-Identifier: MIT

//! Instance registration, heartbeat, and stale-claim reclamation (§4.1 of
//! the executor runtime design).

use chrono::Duration as ChronoDuration;
use std::path::Path;
use std::process;
use supervisor_core::{Clock, ExecutorId, ExecutorInstance};
use supervisor_storage::{StoreError, TrackerStore};
use tokio::process::Command;
use tracing::{info, warn};

/// Register this process as a fresh executor instance, then run reclamation
/// once before any work is claimed. Running reclamation first prevents the
/// new instance from stealing work a dead peer still appears to hold.
pub async fn start<St: TrackerStore, C: Clock>(
    store: &St,
    clock: &C,
    stale_threshold: std::time::Duration,
    version: &str,
) -> Result<ExecutorInstance, StoreError> {
    let hostname = hostname();
    let pid = process::id();
    let instance = store
        .register_instance(&hostname, pid, version, clock.now_utc())
        .await?;

    let reclaimed = store
        .cleanup_stale_instances(chrono_from_std(stale_threshold), clock.now_utc())
        .await?;
    if reclaimed > 0 {
        info!(reclaimed, "reclaimed stale instances on start");
    }

    Ok(instance)
}

/// Touch this instance's heartbeat. Call once per work-loop tick.
pub async fn heartbeat<St: TrackerStore, C: Clock>(
    store: &St,
    clock: &C,
    id: &ExecutorId,
) -> Result<(), StoreError> {
    store.update_heartbeat(id, clock.now_utc()).await
}

/// Mark this instance stopped on graceful shutdown.
pub async fn stop<St: TrackerStore, C: Clock>(
    store: &St,
    clock: &C,
    id: &ExecutorId,
) -> Result<(), StoreError> {
    store.mark_instance_stopped(id, clock.now_utc()).await
}

/// Re-run the reclamation sweep. Used by both `start` and the stale-instance
/// janitor on its periodic tick.
pub async fn reclaim_stale<St: TrackerStore, C: Clock>(
    store: &St,
    clock: &C,
    stale_threshold: std::time::Duration,
) -> Result<usize, StoreError> {
    store
        .cleanup_stale_instances(chrono_from_std(stale_threshold), clock.now_utc())
        .await
}

fn chrono_from_std(duration: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// Enumerate mission branches with no live sandbox and older than
/// `orphan_branch_age`, deleting them. Best-effort: failures are logged,
/// never fatal, per §4.1.
pub async fn sweep_orphaned_branches(
    parent_repo: &Path,
    orphan_branch_age: std::time::Duration,
    live_branches: &[String],
) {
    let output = Command::new("git")
        .args([
            "-C",
            &parent_repo.display().to_string(),
            "for-each-ref",
            "--format=%(refname:short) %(committerdate:unix)",
            "refs/heads/mission/",
        ])
        .output()
        .await;

    let output = match output {
        Ok(o) if o.status.success() => o,
        Ok(o) => {
            warn!(
                stderr = %String::from_utf8_lossy(&o.stderr),
                "failed to list mission branches for orphan sweep"
            );
            return;
        }
        Err(e) => {
            warn!(error = %e, "failed to run git for-each-ref during orphan sweep");
            return;
        }
    };

    let now = chrono::Utc::now().timestamp();
    let cutoff_secs = orphan_branch_age.as_secs() as i64;
    let listing = String::from_utf8_lossy(&output.stdout);

    for line in listing.lines() {
        let Some((branch, committed_at)) = line.rsplit_once(' ') else {
            continue;
        };
        if live_branches.iter().any(|b| b == branch) {
            continue;
        }
        let Ok(committed_at) = committed_at.parse::<i64>() else {
            continue;
        };
        if now - committed_at < cutoff_secs {
            continue;
        }

        let delete = Command::new("git")
            .args([
                "-C",
                &parent_repo.display().to_string(),
                "branch",
                "-D",
                branch,
            ])
            .output()
            .await;
        match delete {
            Ok(o) if o.status.success() => info!(branch, "deleted orphaned mission branch"),
            Ok(o) => warn!(
                branch,
                stderr = %String::from_utf8_lossy(&o.stderr),
                "failed to delete orphaned mission branch"
            ),
            Err(e) => warn!(branch, error = %e, "failed to run git branch -D during orphan sweep"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor_core::FakeClock;
    use supervisor_storage::FileStore;

    #[tokio::test]
    async fn start_registers_instance_and_reclaims_stale_peers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(&dir.path().join("wal.jsonl")).expect("open store");
        let clock = FakeClock::new();

        let instance = start(
            &store,
            &clock,
            std::time::Duration::from_secs(300),
            "0.1.0",
        )
        .await
        .expect("start");

        assert_eq!(instance.pid, process::id());

        heartbeat(&store, &clock, &instance.id).await.expect("heartbeat");
        stop(&store, &clock, &instance.id).await.expect("stop");
    }
}
