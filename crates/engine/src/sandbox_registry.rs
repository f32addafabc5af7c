// SPDX-License-Identifier: MIT

//! A small on-disk manifest of sandboxes (§3 "Sandbox", §4.6 janitor
//! pruning). The transactional store's capability set (§6) has no sandbox
//! operations — sandboxes are filesystem + git state, not tracker rows — so
//! this manifest is the supervisor's own record of what it created, kept
//! alongside the sandbox root so a restart can still find and prune them.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use supervisor_core::{IssueId, Sandbox, SandboxId, SandboxStatus};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Serialize, Deserialize, Default)]
struct Manifest {
    sandboxes: Vec<Sandbox>,
}

/// Tracks every sandbox this process has created, backed by a JSON manifest
/// file under the sandbox root.
pub struct SandboxRegistry {
    manifest_path: PathBuf,
    manifest: Mutex<Manifest>,
}

impl SandboxRegistry {
    /// Load (or initialize) the manifest at `<sandbox_root>/manifest.json`.
    pub async fn open(sandbox_root: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(sandbox_root).await?;
        let manifest_path = sandbox_root.join("manifest.json");
        let manifest = match tokio::fs::read(&manifest_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Manifest::default(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            manifest_path,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn record(&self, sandbox: Sandbox) {
        self.manifest.lock().sandboxes.push(sandbox);
    }

    pub fn mark_status(&self, id: &SandboxId, status: SandboxStatus) {
        let mut manifest = self.manifest.lock();
        if let Some(entry) = manifest.sandboxes.iter_mut().find(|s| &s.id == id) {
            entry.status = status;
        }
    }

    pub fn for_issue(&self, issue_id: &IssueId) -> Option<Sandbox> {
        self.manifest
            .lock()
            .sandboxes
            .iter()
            .rev()
            .find(|s| &s.issue_id == issue_id)
            .cloned()
    }

    /// Sandboxes eligible for deletion (torn down / preserved) beyond the
    /// `retention_count` most recently created, oldest first.
    pub fn prune_candidates(&self, retention_count: usize) -> Vec<Sandbox> {
        let mut eligible: Vec<Sandbox> = self
            .manifest
            .lock()
            .sandboxes
            .iter()
            .filter(|s| s.is_eligible_for_deletion())
            .cloned()
            .collect();
        eligible.sort_by_key(|s| s.created_at);
        if eligible.len() > retention_count {
            eligible[..eligible.len() - retention_count].to_vec()
        } else {
            Vec::new()
        }
    }

    pub fn remove(&self, id: &SandboxId) {
        self.manifest.lock().sandboxes.retain(|s| &s.id != id);
    }

    pub fn live_branches(&self) -> Vec<String> {
        self.manifest
            .lock()
            .sandboxes
            .iter()
            .filter(|s| s.status == SandboxStatus::Active)
            .map(|s| s.branch.clone())
            .collect()
    }

    /// Flush the manifest to disk. Called after every mutation that should
    /// survive a crash (creation, status change, pruning).
    pub async fn persist(&self) -> std::io::Result<()> {
        let encoded = {
            let manifest = self.manifest.lock();
            serde_json::to_vec_pretty(&*manifest).unwrap_or_default()
        };
        let tmp_path = self.manifest_path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&encoded).await?;
        file.flush().await?;
        tokio::fs::rename(&tmp_path, &self.manifest_path).await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn count(&self) -> usize {
        self.manifest.lock().sandboxes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(issue_id: IssueId, status: SandboxStatus) -> Sandbox {
        let mut s = Sandbox::new(
            SandboxId::new(),
            issue_id,
            PathBuf::from("/tmp/sbx"),
            "mission/test".to_string(),
            "main",
            Utc::now(),
        );
        s.status = status;
        s
    }

    #[tokio::test]
    async fn record_and_persist_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = SandboxRegistry::open(dir.path()).await.expect("open");
        let issue_id = IssueId::new();
        registry.record(sandbox(issue_id.clone(), SandboxStatus::Active));
        registry.persist().await.expect("persist");

        let reopened = SandboxRegistry::open(dir.path()).await.expect("reopen");
        assert_eq!(reopened.count(), 1);
        assert!(reopened.for_issue(&issue_id).is_some());
    }

    #[tokio::test]
    async fn prune_candidates_respects_retention_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = SandboxRegistry::open(dir.path()).await.expect("open");
        for _ in 0..5 {
            registry.record(sandbox(IssueId::new(), SandboxStatus::TornDown));
        }
        let candidates = registry.prune_candidates(2);
        assert_eq!(candidates.len(), 3);
    }

    #[tokio::test]
    async fn active_sandboxes_are_never_prune_candidates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = SandboxRegistry::open(dir.path()).await.expect("open");
        registry.record(sandbox(IssueId::new(), SandboxStatus::Active));
        assert!(registry.prune_candidates(0).is_empty());
    }
}
