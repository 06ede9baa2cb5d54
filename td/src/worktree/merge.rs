//! Merging a completed task's worktree branch back into the main branch
//! (spec.md §4.4 "Merge back"), run against the main repository checkout,
//! never inside the worktree itself.

use std::path::Path;

use eyre::{Result, bail};
use tokio::process::Command;
use tracing::{info, warn};

/// Result of a merge operation.
#[derive(Debug, Clone)]
pub enum MergeResult {
    Success,
    /// Merge had conflicts that need resolution.
    Conflict { message: String },
}

impl MergeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Conflict { message } => Some(message),
        }
    }
}

/// Merge `auto/{spec_id}` into `main_branch`, run from `repo_root` (the main
/// checkout, not the worktree). Any uncommitted changes left in the
/// worktree are auto-committed first so nothing is silently dropped.
pub async fn merge_to_main(
    repo_root: &Path,
    worktree_path: &Path,
    spec_id: &str,
    main_branch: &str,
    spec_title: &str,
) -> Result<MergeResult> {
    let branch_name = format!("auto/{spec_id}");

    info!(spec_id = %spec_id, branch = %branch_name, spec = %spec_title, "starting merge to main");

    let status = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(worktree_path)
        .output()
        .await?;

    if !status.stdout.is_empty() {
        info!(spec_id = %spec_id, "auto-committing uncommitted changes in worktree before merge");

        Command::new("git")
            .args(["add", "-A"])
            .current_dir(worktree_path)
            .output()
            .await?;

        let commit_msg = format!("WIP: auto-commit before merge for {spec_title}");
        let commit_output = Command::new("git")
            .args(["commit", "-m", &commit_msg])
            .current_dir(worktree_path)
            .output()
            .await?;

        if !commit_output.status.success() {
            let stderr = String::from_utf8_lossy(&commit_output.stderr);
            warn!(spec_id = %spec_id, %stderr, "auto-commit failed, continuing (may be nothing to commit)");
        }
    }

    let checkout_output = Command::new("git")
        .args(["checkout", main_branch])
        .current_dir(repo_root)
        .output()
        .await?;

    if !checkout_output.status.success() {
        let stderr = String::from_utf8_lossy(&checkout_output.stderr);
        bail!("failed to checkout {main_branch}: {stderr}");
    }

    let merge_msg = format!("Merge spec: {spec_title}");
    let merge_output = Command::new("git")
        .args(["merge", "--no-ff", &branch_name, "-m", &merge_msg])
        .current_dir(repo_root)
        .output()
        .await?;

    if !merge_output.status.success() {
        let stderr = String::from_utf8_lossy(&merge_output.stderr);
        if stderr.contains("CONFLICT") {
            warn!(spec_id = %spec_id, "merge conflict");
            return Ok(MergeResult::Conflict {
                message: stderr.to_string(),
            });
        }
        bail!("merge failed: {stderr}");
    }

    info!(spec_id = %spec_id, branch = %branch_name, "merged into {main_branch}");
    Ok(MergeResult::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_git_repo(dir: &Path) {
        Command::new("git")
            .args(["init", "-b", "main"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();

        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();

        Command::new("git")
            .args(["commit", "--allow-empty", "-m", "initial"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
    }

    #[test]
    fn merge_result_is_success() {
        assert!(MergeResult::Success.is_success());
        assert!(
            !MergeResult::Conflict {
                message: "conflict".into()
            }
            .is_success()
        );
    }

    #[test]
    fn merge_result_is_conflict() {
        assert!(!MergeResult::Success.is_conflict());
        assert!(
            MergeResult::Conflict {
                message: "conflict".into()
            }
            .is_conflict()
        );
    }

    #[test]
    fn merge_result_error_message() {
        assert!(MergeResult::Success.error_message().is_none());
        assert_eq!(
            MergeResult::Conflict { message: "test".into() }.error_message(),
            Some("test")
        );
    }

    #[tokio::test]
    async fn merge_nonexistent_branch_fails() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();

        setup_git_repo(repo_dir.path()).await;

        let result = merge_to_main(repo_dir.path(), worktree_dir.path(), "nonexistent", "main", "Test Spec").await;

        assert!(result.is_err());
    }
}
