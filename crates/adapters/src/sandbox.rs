// SPDX-License-Identifier: MIT

//! Git worktree sandbox lifecycle: each issue executes inside its own
//! worktree + branch, checked out from the host repository, and torn down
//! (or preserved for inspection) once the execution finishes.

use crate::subprocess::{run_with_timeout, GIT_BRANCH_TIMEOUT, GIT_WORKTREE_TIMEOUT};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create sandbox directory: {0}")]
    CreateDir(String),
    #[error("git worktree add failed: {0}")]
    WorktreeAdd(String),
    #[error("git worktree remove failed: {0}")]
    WorktreeRemove(String),
    #[error("git branch delete failed: {0}")]
    BranchDelete(String),
    #[error("subprocess error: {0}")]
    Subprocess(String),
}

/// Where a sandbox was materialized and the branch it tracks.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub path: PathBuf,
    pub branch: String,
}

/// Creates and tears down git worktree sandboxes for issue executions.
#[async_trait]
pub trait SandboxManager: Send + Sync {
    /// Create a new worktree at `path`, branching `branch` from
    /// `start_point` (defaults to `HEAD` when `None`).
    async fn create(
        &self,
        path: &Path,
        branch: &str,
        start_point: Option<&str>,
    ) -> Result<SandboxHandle, SandboxError>;

    /// Remove the worktree and delete its branch. Best-effort: a failure to
    /// unregister the worktree still attempts directory removal so the
    /// sandbox doesn't linger on disk.
    async fn destroy(&self, handle: &SandboxHandle) -> Result<(), SandboxError>;
}

/// `SandboxManager` backed by the host repository's `git worktree` plumbing.
pub struct WorktreeSandboxManager {
    repo_root: PathBuf,
}

impl WorktreeSandboxManager {
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }
}

#[async_trait]
impl SandboxManager for WorktreeSandboxManager {
    async fn create(
        &self,
        path: &Path,
        branch: &str,
        start_point: Option<&str>,
    ) -> Result<SandboxHandle, SandboxError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::CreateDir(e.to_string()))?;
        }

        let start_point = start_point.unwrap_or("HEAD");
        let path_str = path.display().to_string();

        let mut cmd = Command::new("git");
        cmd.args([
            "-C",
            &self.repo_root.display().to_string(),
            "worktree",
            "add",
            "-b",
            branch,
            &path_str,
            start_point,
        ])
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");

        let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree add")
            .await
            .map_err(SandboxError::Subprocess)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::WorktreeAdd(stderr.trim().to_string()));
        }

        Ok(SandboxHandle {
            path: path.to_path_buf(),
            branch: branch.to_string(),
        })
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        let mut remove_cmd = Command::new("git");
        remove_cmd
            .arg("worktree")
            .arg("remove")
            .arg("--force")
            .arg(&handle.path)
            .current_dir(&self.repo_root);
        let remove_result = run_with_timeout(remove_cmd, GIT_WORKTREE_TIMEOUT, "git worktree remove")
            .await;

        let mut branch_cmd = Command::new("git");
        branch_cmd
            .args([
                "-C",
                &self.repo_root.display().to_string(),
                "branch",
                "-D",
                &handle.branch,
            ])
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let _ = run_with_timeout(branch_cmd, GIT_BRANCH_TIMEOUT, "git branch delete").await;

        if handle.path.exists() {
            tokio::fs::remove_dir_all(&handle.path)
                .await
                .map_err(|e| SandboxError::CreateDir(e.to_string()))?;
        }

        match remove_result {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(SandboxError::WorktreeRemove(stderr.trim().to_string()))
            }
            Err(e) => Err(SandboxError::Subprocess(e)),
            Ok(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn init_repo() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let run = |args: &[&str]| {
            let status = StdCommand::new("git")
                .args(args)
                .current_dir(dir.path())
                .status()
                .expect("git");
            assert!(status.success());
        };
        run(&["init", "-q", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("README.md"), "hello").expect("write");
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);
        dir
    }

    #[tokio::test]
    async fn create_and_destroy_round_trip() {
        let repo = init_repo();
        let manager = WorktreeSandboxManager::new(repo.path().to_path_buf());
        let worktree_parent = tempfile::tempdir().expect("tempdir");
        let worktree_path = worktree_parent.path().join("sbx");

        let handle = manager
            .create(&worktree_path, "mission/test-branch", None)
            .await
            .expect("create");
        assert!(handle.path.join("README.md").exists());

        manager.destroy(&handle).await.expect("destroy");
        assert!(!handle.path.exists());
    }
}
