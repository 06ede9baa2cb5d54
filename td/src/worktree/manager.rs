//! Worktree Manager (spec.md §3.1, §4.4): one detached git worktree per
//! running task, isolating its file changes from the main repo and from
//! every other task running concurrently.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eyre::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Error types for worktree operations
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("Failed to create worktree: {0}")]
    CreateFailed(String),

    #[error("Failed to remove worktree: {0}")]
    RemoveFailed(String),

    #[error("Worktree not found: {0}")]
    NotFound(String),

    #[error("Worktree corrupted: {0}")]
    Corrupted(String),

    #[error("Disk space error: {0}")]
    DiskSpace(String),

    #[error("Git command failed: {0}")]
    GitError(String),
}

const BRANCH_PREFIX: &str = "auto";
/// Upper bound on how long `remove` retries a busy worktree before giving up.
const REMOVE_DEADLINE: Duration = Duration::from_secs(30);

/// Configuration for the worktree manager.
#[derive(Debug, Clone)]
pub struct WorktreeConfig {
    /// `{projectRoot}/.auto-claude/worktrees/tasks` — parent of every task's
    /// worktree directory, named by spec id.
    pub tasks_dir: PathBuf,

    /// Path to the main repository.
    pub repo_root: PathBuf,

    /// Minimum disk space in GB before refusing to create worktrees.
    pub min_disk_space_gb: u64,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from(".auto-claude/worktrees/tasks"),
            repo_root: PathBuf::from("."),
            min_disk_space_gb: 5,
        }
    }
}

impl WorktreeConfig {
    /// Derive the conventional layout — `{repoRoot}/.auto-claude/worktrees/tasks` —
    /// from a repository root.
    pub fn with_repo(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        let tasks_dir = repo_root.join(".auto-claude").join("worktrees").join("tasks");
        Self {
            tasks_dir,
            repo_root,
            ..Default::default()
        }
    }
}

/// Information about a task's worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub spec_id: String,
    pub path: PathBuf,
    pub branch: String,
}

/// Creates, validates, and tears down git worktrees, one per running task.
pub struct WorktreeManager {
    config: WorktreeConfig,
}

impl WorktreeManager {
    pub fn new(config: WorktreeConfig) -> Self {
        debug!(?config, "WorktreeManager::new: called");
        Self { config }
    }

    fn branch_name(spec_id: &str) -> String {
        format!("{BRANCH_PREFIX}/{spec_id}")
    }

    fn spec_id_from_branch(branch: &str) -> Option<&str> {
        branch.strip_prefix(&format!("{BRANCH_PREFIX}/"))
    }

    /// Path a task's worktree lives (or would live) at.
    pub fn worktree_path(&self, spec_id: &str) -> PathBuf {
        self.config.tasks_dir.join(spec_id)
    }

    pub fn exists(&self, spec_id: &str) -> bool {
        self.worktree_path(spec_id).exists()
    }

    /// Create a worktree for `spec_id`, detached from `base_branch`, then
    /// check out a fresh `auto/{specId}` branch inside it. If a worktree
    /// from a previous run already exists at the conventional path and
    /// passes [`Self::is_valid`], it's reused as-is rather than recreated.
    pub async fn create(&self, spec_id: &str, base_branch: &str) -> Result<WorktreeInfo, WorktreeError> {
        debug!(%spec_id, %base_branch, "WorktreeManager::create: called");
        self.ensure_disk_space().await?;

        let path = self.worktree_path(spec_id);
        let branch = Self::branch_name(spec_id);

        if path.exists() {
            if self.is_valid(spec_id).await {
                debug!(%spec_id, "WorktreeManager::create: reusing existing valid worktree");
                return Ok(WorktreeInfo {
                    spec_id: spec_id.to_string(),
                    path,
                    branch,
                });
            }
            warn!(%spec_id, ?path, "stale worktree found, recreating");
            self.force_remove(spec_id).await;
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorktreeError::CreateFailed(format!("failed to create {parent:?}: {e}")))?;
        }

        let output = Command::new("git")
            .args(["worktree", "add", "--detach", path.to_str().unwrap(), base_branch])
            .current_dir(&self.config.repo_root)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorktreeError::CreateFailed(stderr.to_string()));
        }
        debug!(%spec_id, "WorktreeManager::create: detached worktree added");

        let output = Command::new("git")
            .args(["checkout", "-b", &branch])
            .current_dir(&path)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = self.force_remove(spec_id).await;
            return Err(WorktreeError::CreateFailed(stderr.to_string()));
        }

        info!(%spec_id, ?path, %branch, "created worktree");
        Ok(WorktreeInfo {
            spec_id: spec_id.to_string(),
            path,
            branch,
        })
    }

    /// Remove a worktree, retrying with exponential backoff (up to 30s
    /// total) while git reports it busy before giving up.
    pub async fn remove(&self, spec_id: &str) -> Result<(), WorktreeError> {
        debug!(%spec_id, "WorktreeManager::remove: called");
        let path = self.worktree_path(spec_id);

        if !path.exists() {
            debug!(%spec_id, "WorktreeManager::remove: already gone");
            return Ok(());
        }

        let deadline = Instant::now() + REMOVE_DEADLINE;
        let mut backoff = Duration::from_millis(250);
        loop {
            let output = Command::new("git")
                .args(["worktree", "remove", path.to_str().unwrap(), "--force"])
                .current_dir(&self.config.repo_root)
                .output()
                .await
                .map_err(|e| WorktreeError::GitError(e.to_string()))?;

            if output.status.success() {
                break;
            }

            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("is not a working tree") {
                break;
            }

            if Instant::now() >= deadline {
                return Err(WorktreeError::RemoveFailed(stderr));
            }
            warn!(%spec_id, backoff_ms = backoff.as_millis() as u64, "worktree busy, retrying removal");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(5));
        }

        let branch = Self::branch_name(spec_id);
        let _ = Command::new("git")
            .args(["branch", "-D", &branch])
            .current_dir(&self.config.repo_root)
            .output()
            .await;

        info!(%spec_id, "removed worktree");
        Ok(())
    }

    /// Best-effort removal used to clear a worktree git no longer considers
    /// valid: tries the normal path once, prunes git's own bookkeeping, then
    /// deletes whatever directory remains.
    async fn force_remove(&self, spec_id: &str) {
        let path = self.worktree_path(spec_id);
        let _ = Command::new("git")
            .args(["worktree", "remove", path.to_str().unwrap(), "--force"])
            .current_dir(&self.config.repo_root)
            .output()
            .await;
        let _ = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.config.repo_root)
            .output()
            .await;
        if path.exists() {
            let _ = tokio::fs::remove_dir_all(&path).await;
        }
    }

    /// Validate a worktree is healthy: present, registered with git, and
    /// known to `list()`. Returns the specific failure reason.
    pub async fn validate(&self, spec_id: &str) -> Result<(), WorktreeError> {
        let path = self.worktree_path(spec_id);
        if !path.exists() {
            return Err(WorktreeError::NotFound(spec_id.to_string()));
        }
        if self.is_valid(spec_id).await {
            Ok(())
        } else {
            Err(WorktreeError::Corrupted(spec_id.to_string()))
        }
    }

    /// Three-part worktree validity check: `.git` is a regular file (not a
    /// directory — that's what distinguishes a worktree checkout from a
    /// normal clone), its `gitdir:` pointer resolves under
    /// `{repoRoot}/.git/worktrees/`, and the path still appears in
    /// `git worktree list`.
    async fn is_valid(&self, spec_id: &str) -> bool {
        let path = self.worktree_path(spec_id);
        let git_file = path.join(".git");

        let meta = match tokio::fs::symlink_metadata(&git_file).await {
            Ok(m) => m,
            Err(_) => return false,
        };
        if !meta.is_file() {
            return false;
        }

        let content = match tokio::fs::read_to_string(&git_file).await {
            Ok(c) => c,
            Err(_) => return false,
        };
        let gitdir = match content.trim().strip_prefix("gitdir:") {
            Some(rest) => rest.trim(),
            None => return false,
        };
        if gitdir.is_empty() {
            return false;
        }

        let resolved = match tokio::fs::canonicalize(path.join(gitdir)).await {
            Ok(p) => p,
            Err(_) => return false,
        };
        let expected_root = match tokio::fs::canonicalize(self.config.repo_root.join(".git").join("worktrees")).await
        {
            Ok(p) => p,
            Err(_) => return false,
        };
        if !resolved.starts_with(&expected_root) {
            return false;
        }

        match self.list().await {
            Ok(worktrees) => worktrees.iter().any(|w| w.path == path),
            Err(_) => false,
        }
    }

    /// List every task worktree git currently tracks under `tasks_dir`, by
    /// parsing `git worktree list --porcelain`. This reflects git's own
    /// bookkeeping rather than reconstructing state from directory names.
    pub async fn list(&self) -> Result<Vec<WorktreeInfo>> {
        let output = Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(&self.config.repo_root)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;

        if !output.status.success() {
            return Err(WorktreeError::GitError(String::from_utf8_lossy(&output.stderr).to_string()).into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut result = Vec::new();
        let mut cur_path: Option<PathBuf> = None;
        let mut cur_branch: Option<String> = None;

        let mut flush = |path: Option<PathBuf>, branch: Option<String>, out: &mut Vec<WorktreeInfo>| {
            let (Some(path), Some(branch)) = (path, branch) else {
                return;
            };
            if let Some(spec_id) = Self::spec_id_from_branch(&branch) {
                out.push(WorktreeInfo {
                    spec_id: spec_id.to_string(),
                    path,
                    branch,
                });
            }
        };

        for line in stdout.lines() {
            if let Some(p) = line.strip_prefix("worktree ") {
                flush(cur_path.take(), cur_branch.take(), &mut result);
                cur_path = Some(PathBuf::from(p));
            } else if let Some(b) = line.strip_prefix("branch refs/heads/") {
                cur_branch = Some(b.to_string());
            }
        }
        flush(cur_path, cur_branch, &mut result);

        Ok(result
            .into_iter()
            .filter(|w| w.path.starts_with(&self.config.tasks_dir))
            .collect())
    }

    /// Remove every worktree under `tasks_dir` not in `active_spec_ids`.
    pub async fn cleanup_orphaned(&self, active_spec_ids: &[String]) -> Result<usize> {
        let worktrees = self.list().await?;
        let mut cleaned = 0;

        for wt in worktrees {
            if active_spec_ids.contains(&wt.spec_id) {
                continue;
            }
            info!(spec_id = %wt.spec_id, "cleaning up orphaned worktree");
            match self.remove(&wt.spec_id).await {
                Ok(()) => cleaned += 1,
                Err(e) => warn!(spec_id = %wt.spec_id, error = %e, "failed to remove orphaned worktree"),
            }
        }

        Ok(cleaned)
    }

    async fn ensure_disk_space(&self) -> Result<(), WorktreeError> {
        let available_gb = self.check_disk_space().await?;
        if available_gb < self.config.min_disk_space_gb {
            return Err(WorktreeError::DiskSpace(format!(
                "only {available_gb}GB available, need {}GB minimum",
                self.config.min_disk_space_gb
            )));
        }
        Ok(())
    }

    /// Parse `df -BG` for the available space under `tasks_dir`'s parent
    /// filesystem, defaulting to a generous value if parsing fails.
    async fn check_disk_space(&self) -> Result<u64, WorktreeError> {
        let probe = if self.config.tasks_dir.exists() {
            self.config.tasks_dir.clone()
        } else {
            self.config
                .tasks_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
        };

        let output = Command::new("df")
            .args(["-BG", probe.to_str().unwrap_or("/tmp")])
            .output()
            .await
            .map_err(|e| WorktreeError::DiskSpace(format!("failed to check disk space: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().skip(1) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 4 {
                let available = parts[3].trim_end_matches('G');
                if let Ok(gb) = available.parse::<u64>() {
                    return Ok(gb);
                }
            }
        }

        debug!("WorktreeManager::check_disk_space: parsing failed, assuming 100GB free");
        Ok(100)
    }
}
