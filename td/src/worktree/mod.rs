//! Git worktree management
//!
//! Each running task executes in its own detached git worktree on an
//! `auto/{specId}` branch, enabling parallel work without file conflicts.

mod manager;
mod merge;

pub use manager::{WorktreeConfig, WorktreeError, WorktreeInfo, WorktreeManager};
pub use merge::{MergeResult, merge_to_main};
