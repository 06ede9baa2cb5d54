//! Best-effort git snapshotting of the store's data directory.
//!
//! `Store::sync` calls into here so that every committed batch of writes
//! also lands as a commit in the store's directory, if that directory
//! happens to be (or sit inside) a git repository. Absence of git, or any
//! failure running it, is never fatal — sync still succeeds.

use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

pub fn is_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Stage and commit everything under `dir`. No-op (not an error) if there is
/// nothing to commit or `dir` is not inside a git repository.
pub fn snapshot(dir: &Path, message: &str) {
    debug!(?dir, "git::snapshot: called");
    if !is_repo(dir) {
        debug!(?dir, "git::snapshot: not a git repository, skipping");
        return;
    }

    let add = Command::new("git").args(["add", "-A"]).current_dir(dir).output();
    if let Err(e) = add {
        warn!(?dir, error = %e, "git::snapshot: git add failed");
        return;
    }

    let status = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(dir)
        .output();
    match status {
        Ok(out) if out.stdout.is_empty() => {
            debug!(?dir, "git::snapshot: nothing staged, skipping commit");
        }
        Ok(_) => {
            let commit = Command::new("git")
                .args(["commit", "-q", "-m", message])
                .current_dir(dir)
                .output();
            if let Err(e) = commit {
                warn!(?dir, error = %e, "git::snapshot: git commit failed");
            }
        }
        Err(e) => warn!(?dir, error = %e, "git::snapshot: git status failed"),
    }
}
