// SPDX-License-Identifier: MIT

//! `Supervisor`: wires the store, clock, oracle, sandbox manager, and agent
//! adapter together and owns the four long-lived tasks' lifecycle (§5).

use crate::error::{ShutdownDeadlineExceeded, StartError};
use crate::intervention::InterventionController;
use crate::janitor;
use crate::pipeline::PipelineDeps;
use crate::sandbox_registry::SandboxRegistry;
use crate::telemetry::TelemetryMonitor;
use crate::watchdog::{self, WatchdogDeps};
use crate::work_loop;
use std::sync::Arc;
use supervisor_adapters::{AgentProcess, Oracle, SandboxManager};
use supervisor_core::{Clock, ExecutorId, SupervisorConfig};
use supervisor_storage::TrackerStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One running supervisor process: the four long-lived tasks plus the
/// handles needed to stop them in order. Generic only over the store and
/// clock — the oracle, sandbox manager, and agent adapter are consumed by
/// `start` to build the loops and don't need to outlive them here.
pub struct Supervisor<St, C> {
    store: Arc<St>,
    clock: C,
    executor_id: ExecutorId,
    root_cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<St, C> Supervisor<St, C>
where
    St: TrackerStore + 'static,
    C: Clock + 'static,
{
    /// Validate configuration, register the instance, run startup
    /// reclamation and the orphaned-branch sweep, then spawn the work loop,
    /// watchdog loop, and both janitors.
    pub async fn start<O, Sm, Ag>(
        store: Arc<St>,
        clock: C,
        oracle: Arc<O>,
        sandbox_manager: Arc<Sm>,
        agent: Arc<Ag>,
        config: SupervisorConfig,
    ) -> Result<Self, StartError>
    where
        O: Oracle + 'static,
        Sm: SandboxManager + 'static,
        Ag: AgentProcess + 'static,
    {
        config.validate()?;

        let instance = crate::instance::start(&*store, &clock, config.stale_threshold, CRATE_VERSION).await?;
        let executor_id = instance.id.clone();

        let sandbox_registry = Arc::new(
            SandboxRegistry::open(&config.sandbox_root)
                .await
                .map_err(|e| StartError::Store(supervisor_storage::StoreError::Io(e)))?,
        );

        crate::instance::sweep_orphaned_branches(
            &config.parent_repo,
            config.orphan_branch_age,
            &sandbox_registry.live_branches(),
        )
        .await;

        let telemetry = Arc::new(TelemetryMonitor::new());
        let intervention = Arc::new(InterventionController::new(config.watchdog.max_history_size));

        let deps = Arc::new(PipelineDeps {
            store: Arc::clone(&store),
            clock: clock.clone(),
            oracle: Arc::clone(&oracle),
            sandbox_manager: Arc::clone(&sandbox_manager),
            agent,
            telemetry: Arc::clone(&telemetry),
            intervention: Arc::clone(&intervention),
            sandbox_registry: Arc::clone(&sandbox_registry),
            executor_id: executor_id.clone(),
            config: config.clone(),
        });

        let watchdog_deps = Arc::new(WatchdogDeps {
            store: Arc::clone(&store),
            clock: clock.clone(),
            oracle,
            telemetry,
            intervention,
            config: config.watchdog.clone(),
            executor_id: executor_id.clone(),
        });

        let root_cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(work_loop::run(
            deps,
            executor_id.clone(),
            config.poll_interval,
            root_cancel.child_token(),
        )));

        tasks.push(tokio::spawn(watchdog::run(watchdog_deps, root_cancel.child_token())));

        tasks.push(tokio::spawn(janitor::instances::run(
            Arc::clone(&store),
            clock.clone(),
            sandbox_manager,
            sandbox_registry,
            config.clone(),
            root_cancel.child_token(),
        )));

        tasks.push(tokio::spawn(janitor::events::run(
            Arc::clone(&store),
            clock.clone(),
            config.event_retention.clone(),
            executor_id.clone(),
            root_cancel.child_token(),
        )));

        info!(executor_id = %executor_id, "supervisor started");

        Ok(Self {
            store,
            clock,
            executor_id,
            root_cancel,
            tasks,
        })
    }

    /// Broadcast root cancellation and wait for all four loops to finish,
    /// concurrently, up to `deadline`.
    pub async fn stop(mut self, deadline: std::time::Duration) -> Result<(), ShutdownDeadlineExceeded> {
        self.root_cancel.cancel();

        let join_all = async {
            for task in self.tasks.drain(..) {
                if let Err(e) = task.await {
                    warn!(error = %e, "a supervisor task panicked during shutdown");
                }
            }
        };

        tokio::select! {
            _ = join_all => {}
            _ = tokio::time::sleep(deadline) => return Err(ShutdownDeadlineExceeded),
        }

        if let Err(e) = crate::instance::stop(&*self.store, &self.clock, &self.executor_id).await {
            warn!(error = %e, "failed to mark instance stopped");
        }

        Ok(())
    }

    pub fn executor_id(&self) -> &ExecutorId {
        &self.executor_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor_adapters::{FakeAgent, NullOracle, WorktreeSandboxManager};
    use supervisor_core::FakeClock;
    use supervisor_storage::FileStore;

    #[tokio::test]
    async fn start_spawns_the_four_loops_and_stop_joins_them_within_the_deadline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FileStore::open(&dir.path().join("wal.jsonl")).expect("open store"));
        let clock = FakeClock::new();
        let mut config = SupervisorConfig {
            enable_sandboxes: false,
            enable_quality_gates: false,
            enable_ai_supervision: false,
            working_dir: dir.path().to_path_buf(),
            sandbox_root: dir.path().join("sandboxes"),
            poll_interval: std::time::Duration::from_millis(5),
            cleanup_interval: std::time::Duration::from_millis(5),
            ..SupervisorConfig::default()
        };
        config.watchdog.tick_interval = std::time::Duration::from_millis(5);

        let supervisor = Supervisor::start(
            Arc::clone(&store),
            clock.clone(),
            Arc::new(NullOracle),
            Arc::new(WorktreeSandboxManager::new(config.parent_repo.clone())),
            Arc::new(FakeAgent::new(Vec::new(), Some(0))),
            config,
        )
        .await
        .expect("start");

        let executor_id = supervisor.executor_id().clone();
        let instances = store.list_active_instances().await.expect("list instances");
        assert!(instances.iter().any(|i| i.id == executor_id));

        // Give the spawned loops a couple of ticks to actually run before
        // asking them to stop, so shutdown exercises a live select! branch
        // rather than tearing down tasks that never got scheduled.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        supervisor
            .stop(std::time::Duration::from_secs(5))
            .await
            .expect("graceful shutdown within deadline");

        let instances = store.list_active_instances().await.expect("list instances");
        assert!(instances.iter().all(|i| i.id != executor_id), "stopped instance must no longer be active");
    }
}
