//! `DaemonSnapshot`: the Status Bridge's published view (spec.md §3.1),
//! and the atomic-write half of the bridge (`daemon_status.json`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taskstore::now_ms;

use crate::domain::TaskPriority;

/// One currently-running task, as published in [`DaemonSnapshot::running_tasks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningTaskInfo {
    pub spec_dir: String,
    pub pid: Option<u32>,
    pub status: String,
    pub started_at: i64,
    pub last_update: i64,
    pub is_running: bool,
    pub kind: String,
    pub current_subtask: Option<String>,
    pub phase: String,
    pub session: Option<String>,
}

/// One queued task, as published in [`DaemonSnapshot::queued_tasks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTaskInfo {
    pub spec_id: String,
    pub priority: TaskPriority,
}

/// Aggregate counts published alongside the per-task detail.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DaemonStats {
    pub running: usize,
    pub queued: usize,
    pub completed: u64,
}

/// The daemon's full published view: one per daemon, continuously updated
/// (spec.md §3.2, "Daemon 1—1 DaemonSnapshot").
///
/// `running_tasks` and `queued_tasks` are disjoint by construction — a spec
/// id moves from one map to the other, never appearing in both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSnapshot {
    pub running: bool,
    pub started_at: i64,
    pub running_tasks: HashMap<String, RunningTaskInfo>,
    pub queued_tasks: Vec<QueuedTaskInfo>,
    pub stats: DaemonStats,
    pub ws_port: Option<u16>,
    pub timestamp: i64,
}

impl DaemonSnapshot {
    /// A fresh, empty snapshot for a daemon that just started.
    pub fn starting() -> Self {
        Self {
            running: true,
            started_at: now_ms(),
            running_tasks: HashMap::new(),
            queued_tasks: Vec::new(),
            stats: DaemonStats::default(),
            ws_port: None,
            timestamp: now_ms(),
        }
    }

    /// Recompute `stats` from the current task maps and stamp `timestamp`.
    pub fn touch(&mut self, completed: u64) {
        self.stats = DaemonStats {
            running: self.running_tasks.len(),
            queued: self.queued_tasks.len(),
            completed,
        };
        self.timestamp = now_ms();
    }
}

pub(super) fn status_file_path(project_root: &Path) -> PathBuf {
    project_root.join(".auto-claude").join("daemon_status.json")
}

/// Write `snapshot` to `{project}/.auto-claude/daemon_status.json` via a
/// `.tmp` file followed by a rename, so readers never observe a partial
/// write.
pub(super) fn write_snapshot_atomic(project_root: &Path, snapshot: &DaemonSnapshot) -> std::io::Result<()> {
    let path = status_file_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, serde_json::to_vec_pretty(snapshot)?)?;
    std::fs::rename(&tmp_path, &path)
}
