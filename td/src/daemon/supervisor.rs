//! The Task Daemon's admission/recovery loop (spec.md §4.1 "Algorithm —
//! admission", "Algorithm — stuck detection", "Algorithm — auto-verify").
//!
//! One [`Supervisor::tick`] call does the whole cycle: reap finished child
//! processes, detect stuck ones, admit newly eligible tasks onto free
//! worker slots. The daemon's main loop (see `main.rs`) drives `tick` on
//! every discovery event and on a timer, per spec's "run every tick or on
//! change event".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use taskstore::now_ms;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::domain::{ExecutionPhase, SignoffStatus, Task, TaskKind, TaskPriority, TaskStatus, XstateState};
use crate::events::{EventKind, SpecEventLog};
use crate::state::StateManager;
use crate::status::{DaemonSnapshot, QueuedTaskInfo, RunningTaskInfo, StatusBridge};
use crate::worktree::WorktreeManager;

/// A running task's child process and the bookkeeping needed to detect it
/// going stuck.
struct RunningTask {
    child: Child,
    pid: u32,
    started_at: i64,
    /// Updated by a background reader task draining the child's stdout;
    /// each line the child prints counts as a heartbeat.
    last_heartbeat_ms: Arc<AtomicI64>,
    kind: TaskKind,
    terminating_since: Option<i64>,
}

/// Everything [`Supervisor::new`] needs that isn't purely a numeric knob.
pub struct SupervisorHandles {
    pub state: StateManager,
    pub status: Arc<StatusBridge>,
    pub worktrees: WorktreeManager,
}

/// The admission loop's tunables, taken directly from [`crate::config::DaemonRuntimeConfig`]
/// plus the repo/main-branch detail the worktree merge stage needs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub project_dir: PathBuf,
    pub repo_root: PathBuf,
    pub main_branch: String,
    pub max_concurrent: u32,
    pub use_worktrees: bool,
    pub stuck_timeout: Duration,
    pub max_recovery: u32,
    pub max_child_depth: u32,
    pub max_verify_attempts: u32,
}

const TERMINATE_GRACE: Duration = Duration::from_secs(30);
/// spec.md §4.1 Failure semantics: "Worktree acquisition failure → task
/// returns to queue with a 60-second back-off".
const WORKTREE_BACKOFF: Duration = Duration::from_secs(60);
/// spec.md §4.1: "after three consecutive failures mark error".
const MAX_WORKTREE_FAILURES: u32 = 3;

/// Converts eligible tasks into supervised child processes, one per
/// `{current_exe} run-task --spec-id <id>` invocation, and reaps/recovers
/// them as they finish, crash, or go stuck.
pub struct Supervisor {
    config: SupervisorConfig,
    handles: SupervisorHandles,
    running: HashMap<String, RunningTask>,
    completed: u64,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, handles: SupervisorHandles) -> Self {
        Self {
            config,
            handles,
            running: HashMap::new(),
            completed: 0,
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// One full admission/recovery cycle. Callers drive this on every
    /// discovery event and on an idle timer.
    pub async fn tick(&mut self) -> eyre::Result<()> {
        self.reap_finished().await?;
        self.check_stuck().await?;
        self.admit_eligible().await?;
        self.publish_snapshot().await?;
        Ok(())
    }

    /// Send a graceful-then-forced stop to every running child, waiting up
    /// to `grace` before escalating. Used on daemon shutdown.
    pub async fn drain(&mut self, grace: Duration) {
        let spec_ids: Vec<String> = self.running.keys().cloned().collect();
        for spec_id in spec_ids {
            if let Some(task) = self.running.get_mut(&spec_id) {
                send_signal(task.pid, Signal::Sigterm);
            }
        }

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline && !self.running.is_empty() {
            let _ = self.reap_finished().await;
            if !self.running.is_empty() {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }

        for (_spec_id, task) in self.running.iter_mut() {
            send_signal(task.pid, Signal::Sigkill);
        }
        let _ = self.reap_finished().await;
    }

    // === reap ===

    async fn reap_finished(&mut self) -> eyre::Result<()> {
        let spec_ids: Vec<String> = self.running.keys().cloned().collect();
        for spec_id in spec_ids {
            let exited = {
                let running = self.running.get_mut(&spec_id).expect("just listed");
                running.child.try_wait()?
            };
            let Some(status) = exited else { continue };
            let running = self.running.remove(&spec_id).expect("just listed");

            info!(%spec_id, code = ?status.code(), "supervisor: child process exited");
            self.completed += 1;

            let task = self.handles.state.get_task(&spec_id).await.ok().flatten();

            match task {
                Some(task) if task.status.is_terminal() || matches!(task.status, TaskStatus::HumanReview) => {
                    self.on_clean_exit(task).await?;
                }
                Some(task) => {
                    // The child exited without reaching a terminal or
                    // sign-off state: treat it like a crash.
                    self.on_crash(task).await?;
                }
                None => {
                    warn!(%spec_id, "supervisor: reaped child for a task no longer in the store");
                }
            }

            if self.config.use_worktrees {
                let _ = self.handles.worktrees.remove(&spec_id).await;
            }
        }
        Ok(())
    }

    async fn on_clean_exit(&mut self, task: Task) -> eyre::Result<()> {
        if task.kind.auto_verifies() {
            self.maybe_spawn_verify(&task).await?;
        }
        Ok(())
    }

    /// Process crash before first heartbeat doesn't consume a recovery
    /// slot; any crash after that does.
    async fn on_crash(&mut self, mut task: Task) -> eyre::Result<()> {
        let first_crash = task.recovery_count == 0 && task.execution_phase == ExecutionPhase::Planning;
        if !first_crash {
            task.recovery_count += 1;
        }
        self.requeue_or_fail(&mut task).await
    }

    async fn requeue_or_fail(&mut self, task: &mut Task) -> eyre::Result<()> {
        if task.recovery_count < self.config.max_recovery {
            task.transition(TaskStatus::Queue);
            warn!(spec_id = %task.spec_id, recovery_count = task.recovery_count, "supervisor: requeueing task for recovery");
        } else {
            task.transition(TaskStatus::Error);
            warn!(spec_id = %task.spec_id, "supervisor: recovery cap exceeded, marking error");
        }
        self.handles.state.update_task(task.clone()).await?;
        self.append_event(&task.spec_id, EventKind::TaskEvent, serde_json::json!({"recovery": task.recovery_count}))?;
        Ok(())
    }

    // === stuck detection ===

    async fn check_stuck(&mut self) -> eyre::Result<()> {
        let now = now_ms();
        let stuck_ms = self.config.stuck_timeout.as_millis() as i64;
        let grace_deadline_ms = TERMINATE_GRACE.as_millis() as i64;

        let mut to_kill = Vec::new();
        let mut to_finalize = Vec::new();

        for (spec_id, task) in self.running.iter() {
            if let Some(since) = task.terminating_since {
                if now - since > grace_deadline_ms {
                    to_finalize.push(spec_id.clone());
                }
                continue;
            }

            let last = task.last_heartbeat_ms.load(Ordering::Relaxed);
            let plan_mtime = self.spec_dir(spec_id).join("implementation_plan.json").metadata().ok().and_then(|m| m.modified().ok()).map(|t| {
                t.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
            }).unwrap_or(0);
            let events_mtime = self.spec_dir(spec_id).join("events.jsonl").metadata().ok().and_then(|m| m.modified().ok()).map(|t| {
                t.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
            }).unwrap_or(0);

            let most_recent = last.max(plan_mtime).max(events_mtime).max(task.started_at);
            if now - most_recent > stuck_ms {
                to_kill.push(spec_id.clone());
            }
        }

        for spec_id in to_kill {
            warn!(%spec_id, "supervisor: task appears stuck, sending SIGTERM");
            if let Some(running) = self.running.get_mut(&spec_id) {
                send_signal(running.pid, Signal::Sigterm);
                running.terminating_since = Some(now);
            }
        }

        for spec_id in to_finalize {
            warn!(%spec_id, "supervisor: stuck task did not exit within grace period, sending SIGKILL");
            if let Some(running) = self.running.get_mut(&spec_id) {
                send_signal(running.pid, Signal::Sigkill);
            }
        }

        Ok(())
    }

    // === admission ===

    async fn admit_eligible(&mut self) -> eyre::Result<()> {
        if self.running.len() as u32 >= self.config.max_concurrent {
            return Ok(());
        }

        let candidates = self.handles.state.list_eligible_tasks(self.config.max_recovery).await?;
        let now = now_ms();

        for task in candidates {
            if self.running.len() as u32 >= self.config.max_concurrent {
                break;
            }
            if self.running.contains_key(&task.spec_id) {
                continue;
            }
            if matches!(task.kind, TaskKind::Design | TaskKind::Architecture) {
                let depth = self.depth_of(&task).await?;
                if depth >= self.config.max_child_depth {
                    debug!(spec_id = %task.spec_id, depth, "supervisor: skipping, max child depth reached");
                    continue;
                }
            }

            if let Some(last_failure) = task.last_worktree_failure_ms {
                if now - last_failure < WORKTREE_BACKOFF.as_millis() as i64 {
                    debug!(spec_id = %task.spec_id, "supervisor: worktree back-off still in effect, skipping");
                    continue;
                }
            }

            let mut task = task;
            if self.config.use_worktrees {
                if let Err(e) = self.handles.worktrees.create(&task.spec_id, &self.config.main_branch).await {
                    task.worktree_fail_count += 1;
                    task.last_worktree_failure_ms = Some(now);
                    if task.worktree_fail_count >= MAX_WORKTREE_FAILURES {
                        task.transition(TaskStatus::Error);
                        warn!(spec_id = %task.spec_id, error = %e, failures = task.worktree_fail_count, "supervisor: three consecutive worktree acquisition failures, marking error");
                    } else {
                        task.transition(TaskStatus::Queue);
                        warn!(spec_id = %task.spec_id, error = %e, failures = task.worktree_fail_count, "supervisor: worktree acquisition failed, returning to queue with 60s back-off");
                    }
                    self.handles.state.update_task(task.clone()).await?;
                    self.append_event(
                        &task.spec_id,
                        EventKind::TaskEvent,
                        serde_json::json!({"worktree_failure": task.worktree_fail_count}),
                    )?;
                    continue;
                }
                task.worktree_fail_count = 0;
                task.last_worktree_failure_ms = None;
            }

            if let Err(e) = self.spawn_task(task.clone()).await {
                warn!(spec_id = %task.spec_id, error = %e, "supervisor: spawn failed after worktree acquisition, requeueing with recovery back-off");
                let mut task = task;
                task.recovery_count += 1;
                self.requeue_or_fail(&mut task).await?;
            }
        }

        Ok(())
    }

    async fn depth_of(&self, task: &Task) -> eyre::Result<u32> {
        let mut depth = 0;
        let mut current = task.parent_task.clone();
        while let Some(parent_id) = current {
            depth += 1;
            current = self.handles.state.get_task(&parent_id).await?.and_then(|t| t.parent_task);
        }
        Ok(depth)
    }

    /// Spawns the OS child process for an already-admitted task. Worktree
    /// acquisition is the caller's (`admit_eligible`'s) responsibility so it
    /// can apply the dedicated back-off/failure-counter gate from spec.md
    /// §4.1 instead of the generic `recovery_count` path.
    async fn spawn_task(&mut self, mut task: Task) -> eyre::Result<()> {
        let spec_id = task.spec_id.clone();

        task.transition(TaskStatus::InProgress);
        task.set_phase(crate::domain::ExecutionPhase::Coding);
        self.handles.state.update_task(task.clone()).await?;
        self.append_event(&spec_id, EventKind::TaskEvent, serde_json::json!({"admitted": true}))?;

        let exe = std::env::current_exe()?;
        let mut command = tokio::process::Command::new(exe);
        command
            .arg("run-task")
            .arg("--project-dir")
            .arg(&self.config.project_dir)
            .arg("--spec-id")
            .arg(&spec_id)
            .arg("--repo-root")
            .arg(&self.config.repo_root)
            .arg("--main-branch")
            .arg(&self.config.main_branch)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if self.config.use_worktrees {
            command.arg("--use-worktree");
        }

        let mut child = command.spawn()?;
        let pid = child.id().ok_or_else(|| eyre::eyre!("child exited immediately"))?;

        let last_heartbeat_ms = Arc::new(AtomicI64::new(now_ms()));
        if let Some(stdout) = child.stdout.take() {
            let heartbeat = last_heartbeat_ms.clone();
            let spec_id_for_log = spec_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    heartbeat.store(now_ms(), Ordering::Relaxed);
                    debug!(spec_id = %spec_id_for_log, %line, "run-task stdout");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let spec_id_for_log = spec_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(spec_id = %spec_id_for_log, %line, "run-task stderr");
                }
            });
        }

        info!(spec_id = %spec_id, pid, "supervisor: admitted task");

        self.running.insert(
            spec_id,
            RunningTask {
                child,
                pid,
                started_at: now_ms(),
                last_heartbeat_ms,
                kind: task.kind,
                terminating_since: None,
            },
        );

        Ok(())
    }

    // === auto-verify ===

    async fn maybe_spawn_verify(&mut self, parent: &Task) -> eyre::Result<()> {
        let plan = self.handles.state.get_plan(&parent.spec_id).await?;
        let Some(plan) = plan else { return Ok(()) };

        if plan.xstate_state() != XstateState::HumanReview || !matches!(plan.qa_signoff.status, SignoffStatus::Approved) {
            return Ok(());
        }

        let siblings = self.handles.state.list_tasks_for_parent(&parent.spec_id).await?;
        let attempt = siblings
            .iter()
            .filter(|t| t.kind == TaskKind::Verify)
            .count() as u32
            + 1;

        if attempt > self.config.max_verify_attempts {
            info!(spec_id = %parent.spec_id, attempt, "supervisor: max verify attempts reached, not spawning another");
            return Ok(());
        }

        let verify_id = if attempt == 1 {
            format!("verify-{}", parent.spec_id)
        } else {
            format!("verify-{}-{}", parent.spec_id, attempt)
        };

        let verify_task = Task::new(verify_id.clone(), TaskKind::Verify, TaskPriority::new(1))
            .with_parent(parent.spec_id.clone())
            .with_depends_on(vec![parent.spec_id.clone()]);

        self.handles.state.create_task(verify_task).await?;
        info!(parent = %parent.spec_id, verify_id = %verify_id, attempt, "supervisor: synthesized verify task");
        Ok(())
    }

    // === status bridge ===

    async fn publish_snapshot(&self) -> eyre::Result<()> {
        let mut snapshot = DaemonSnapshot::starting();
        snapshot.running = true;

        for (spec_id, running) in &self.running {
            snapshot.running_tasks.insert(
                spec_id.clone(),
                RunningTaskInfo {
                    spec_dir: spec_id.clone(),
                    pid: Some(running.pid),
                    status: "in_progress".to_string(),
                    started_at: running.started_at,
                    last_update: running.last_heartbeat_ms.load(Ordering::Relaxed),
                    is_running: true,
                    kind: format!("{:?}", running.kind),
                    current_subtask: None,
                    phase: "coding".to_string(),
                    session: None,
                },
            );
        }

        let queued = self.handles.state.list_eligible_tasks(self.config.max_recovery).await.unwrap_or_default();
        snapshot.queued_tasks = queued
            .into_iter()
            .map(|t| QueuedTaskInfo {
                spec_id: t.spec_id,
                priority: t.priority,
            })
            .collect();

        self.handles.status.publish(snapshot, self.completed).await;
        Ok(())
    }

    fn spec_dir(&self, spec_id: &str) -> PathBuf {
        self.config.project_dir.join("specs").join(spec_id)
    }

    fn append_event(&self, spec_id: &str, kind: EventKind, payload: serde_json::Value) -> eyre::Result<()> {
        let spec_dir = self.spec_dir(spec_id);
        std::fs::create_dir_all(&spec_dir)?;
        let mut log = SpecEventLog::open(&spec_dir)?;
        log.append(kind, payload)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Sigterm,
    Sigkill,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) {
    use nix::sys::signal::{self, Signal as NixSignal};
    use nix::unistd::Pid;

    let nix_signal = match signal {
        Signal::Sigterm => NixSignal::SIGTERM,
        Signal::Sigkill => NixSignal::SIGKILL,
    };
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), nix_signal) {
        debug!(pid, ?signal, error = %e, "supervisor: failed to signal child (likely already exited)");
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: Signal) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskPriority;
    use crate::worktree::WorktreeConfig;
    use tempfile::tempdir;

    async fn test_handles(project_dir: &std::path::Path) -> SupervisorHandles {
        let state = StateManager::spawn(project_dir.join(".taskstore")).unwrap();
        let status = Arc::new(StatusBridge::new(project_dir));
        let worktrees = WorktreeManager::new(WorktreeConfig::with_repo(project_dir));
        SupervisorHandles { state, status, worktrees }
    }

    fn test_config(project_dir: &std::path::Path) -> SupervisorConfig {
        SupervisorConfig {
            project_dir: project_dir.to_path_buf(),
            repo_root: project_dir.to_path_buf(),
            main_branch: "main".to_string(),
            max_concurrent: 2,
            use_worktrees: false,
            stuck_timeout: Duration::from_secs(600),
            max_recovery: 3,
            max_child_depth: 2,
            max_verify_attempts: 3,
        }
    }

    #[tokio::test]
    async fn depth_of_counts_ancestor_chain() {
        let dir = tempdir().unwrap();
        let handles = test_handles(dir.path()).await;
        let config = test_config(dir.path());

        let grandparent = Task::new("001-root", TaskKind::Design, TaskPriority::default());
        handles.state.create_task(grandparent).await.unwrap();
        let parent = Task::new("002-mid", TaskKind::Design, TaskPriority::default()).with_parent("001-root");
        handles.state.create_task(parent).await.unwrap();
        let child = Task::new("003-leaf", TaskKind::Design, TaskPriority::default()).with_parent("002-mid");
        handles.state.create_task(child.clone()).await.unwrap();

        let supervisor = Supervisor::new(config, handles);
        assert_eq!(supervisor.depth_of(&child).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn admit_eligible_respects_max_concurrent_with_nothing_running() {
        let dir = tempdir().unwrap();
        let handles = test_handles(dir.path()).await;
        let mut config = test_config(dir.path());
        config.max_concurrent = 0;

        let mut supervisor = Supervisor::new(config, handles);
        let task = Task::new("001-a", TaskKind::Impl, TaskPriority::default());
        supervisor.handles.state.create_task(task).await.unwrap();

        supervisor.admit_eligible().await.unwrap();
        assert_eq!(supervisor.running_count(), 0);
    }

    #[tokio::test]
    async fn worktree_acquisition_failure_backs_off_then_errors_after_three() {
        // repo_root isn't a git repository, so every `worktrees.create` call fails.
        let dir = tempdir().unwrap();
        let handles = test_handles(dir.path()).await;
        let mut config = test_config(dir.path());
        config.use_worktrees = true;

        let mut supervisor = Supervisor::new(config, handles);
        let task = Task::new("001-a", TaskKind::Impl, TaskPriority::default());
        supervisor.handles.state.create_task(task).await.unwrap();

        supervisor.admit_eligible().await.unwrap();
        let task = supervisor.handles.state.get_task("001-a").await.unwrap().unwrap();
        assert_eq!(task.worktree_fail_count, 1);
        assert_eq!(task.status, TaskStatus::Queue);
        assert!(task.last_worktree_failure_ms.is_some());
        assert_eq!(supervisor.running_count(), 0);

        // Immediate re-admission is gated by the 60s back-off.
        supervisor.admit_eligible().await.unwrap();
        let task = supervisor.handles.state.get_task("001-a").await.unwrap().unwrap();
        assert_eq!(task.worktree_fail_count, 1);

        // Simulate the back-off having elapsed and fail twice more.
        let mut stale = task.clone();
        stale.last_worktree_failure_ms = Some(now_ms() - WORKTREE_BACKOFF.as_millis() as i64 - 1);
        supervisor.handles.state.update_task(stale).await.unwrap();
        supervisor.admit_eligible().await.unwrap();

        let mut stale = supervisor.handles.state.get_task("001-a").await.unwrap().unwrap();
        assert_eq!(stale.worktree_fail_count, 2);
        stale.last_worktree_failure_ms = Some(now_ms() - WORKTREE_BACKOFF.as_millis() as i64 - 1);
        supervisor.handles.state.update_task(stale).await.unwrap();
        supervisor.admit_eligible().await.unwrap();

        let task = supervisor.handles.state.get_task("001-a").await.unwrap().unwrap();
        assert_eq!(task.worktree_fail_count, 3);
        assert_eq!(task.status, TaskStatus::Error);
    }
}
