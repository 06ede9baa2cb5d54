//! StateManager - actor that owns TaskStore
//!
//! Processes commands via channels for thread-safe access to persistent state.
//! Owns the `Task` and `Plan` collections; the Event Log lives separately as
//! per-spec `events.jsonl` files (see `crate::events::SpecEventLog`) since it
//! is an append-only file contract, not an indexed record.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::{Filter, FilterOp, IndexValue, Plan, Store, Task, TaskStatus};

use super::messages::{StateCommand, StateError, StateResponse};

/// Aggregated metrics from the daemon's state
#[derive(Debug, Default, serde::Serialize)]
pub struct DaemonMetrics {
    pub total_tasks: u64,
    pub queued: u64,
    pub in_progress: u64,
    pub ai_review: u64,
    pub qa_fixing: u64,
    pub human_review: u64,
    pub done: u64,
    pub error: u64,
}

/// Event broadcast when state changes that observers (Status Bridge, TUI) should react to
#[derive(Debug, Clone)]
pub enum StateEvent {
    TaskCreated { spec_id: String, kind: String },
    TaskUpdated { spec_id: String },
    TaskQueued { spec_id: String },
    PlanUpdated { spec_id: String },
}

/// Path to the state change notification file
/// This file contains a monotonically increasing counter that's bumped on every state change.
/// External processes can poll this file to detect when they should refresh.
fn state_notify_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("taskdaemon")
        .join(".state_version")
}

/// Bump the state version to notify other processes of changes
fn notify_state_change() {
    let path = state_notify_path();

    let version: u64 = std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);

    if let Err(e) = std::fs::write(&path, format!("{}", version + 1)) {
        tracing::debug!(error = %e, "Failed to write state notification file");
    }
}

/// Read the current state version (for external processes to poll)
pub fn read_state_version() -> u64 {
    std::fs::read_to_string(state_notify_path())
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    event_tx: tokio::sync::broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Spawn a new StateManager actor
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let mut store = Store::open(store_path.as_ref())?;

        let task_count = store.rebuild_indexes::<Task>()?;
        let plan_count = store.rebuild_indexes::<Plan>()?;
        info!(task_count, plan_count, "Rebuilt indexes for Task and Plan records");

        let (tx, rx) = mpsc::channel(256);
        let (event_tx, _) = tokio::sync::broadcast::channel(64);

        tokio::spawn(actor_loop(store, rx));

        info!("StateManager spawned");

        Ok(Self { tx, event_tx })
    }

    /// Subscribe to state change events (for instant Status Bridge / TUI updates)
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    /// Mark a task queued and ready for pickup. The daemon discovers it via
    /// its directory watch / periodic re-scan rather than a push notification —
    /// no separate wake-up channel to keep alive across process boundaries.
    async fn notify_daemon_queued(&self, spec_id: &str) {
        debug!(%spec_id, "notify_daemon_queued: task queued, daemon will discover via watch/re-scan");
    }

    // === Task operations ===

    pub async fn create_task(&self, task: Task) -> StateResponse<String> {
        debug!(spec_id = %task.spec_id, kind = ?task.kind, "create_task: called");
        let spec_id = task.spec_id.clone();
        let kind = format!("{:?}", task.kind);
        let is_queued = task.status.is_queued();

        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreateTask { task, reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        let result = reply_rx.await.map_err(|_| StateError::ChannelError)?;

        if result.is_ok() {
            let _ = self.event_tx.send(StateEvent::TaskCreated {
                spec_id: spec_id.clone(),
                kind,
            });
            notify_state_change();
            if is_queued {
                let _ = self.event_tx.send(StateEvent::TaskQueued { spec_id: spec_id.clone() });
                self.notify_daemon_queued(&spec_id).await;
            }
        }

        result
    }

    pub async fn get_task(&self, spec_id: &str) -> StateResponse<Option<Task>> {
        debug!(%spec_id, "get_task: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetTask {
                spec_id: spec_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn get_task_required(&self, spec_id: &str) -> Result<Task, StateError> {
        self.get_task(spec_id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Task {}", spec_id)))
    }

    pub async fn update_task(&self, task: Task) -> StateResponse<()> {
        debug!(spec_id = %task.spec_id, status = ?task.status, "update_task: called");
        let spec_id = task.spec_id.clone();
        let now_queued = task.status.is_queued();

        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdateTask { task, reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        let result = reply_rx.await.map_err(|_| StateError::ChannelError)?;

        if result.is_ok() {
            let _ = self.event_tx.send(StateEvent::TaskUpdated { spec_id: spec_id.clone() });
            notify_state_change();
            if now_queued {
                let _ = self.event_tx.send(StateEvent::TaskQueued { spec_id: spec_id.clone() });
                self.notify_daemon_queued(&spec_id).await;
            }
        }

        result
    }

    /// List tasks with optional filters.
    pub async fn list_tasks(
        &self,
        status_filter: Option<String>,
        kind_filter: Option<String>,
        parent_filter: Option<String>,
    ) -> StateResponse<Vec<Task>> {
        debug!(?status_filter, ?kind_filter, ?parent_filter, "list_tasks: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListTasks {
                status_filter,
                kind_filter,
                parent_filter,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn list_tasks_for_parent(&self, parent_id: &str) -> StateResponse<Vec<Task>> {
        self.list_tasks(None, None, Some(parent_id.to_string())).await
    }

    /// Eligible tasks for admission: queued, under the recovery cap, with all
    /// dependencies done. Sorted by priority ascending, then creation time,
    /// then lexicographic specId (the daemon's admission tie-break order).
    pub async fn list_eligible_tasks(&self, max_recovery: u32) -> StateResponse<Vec<Task>> {
        let all = self.list_tasks(None, None, None).await?;
        let done: std::collections::HashSet<&str> = all
            .iter()
            .filter(|t| t.status.is_terminal() && t.status == TaskStatus::Done)
            .map(|t| t.spec_id.as_str())
            .collect();

        let mut eligible: Vec<Task> = all
            .into_iter()
            .filter(|t| {
                t.status.is_queued()
                    && t.recovery_count < max_recovery
                    && t.depends_on.iter().all(|d| done.contains(d.as_str()))
            })
            .collect();

        eligible.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.spec_id.cmp(&b.spec_id))
        });

        Ok(eligible)
    }

    pub async fn delete_task(&self, spec_id: &str) -> StateResponse<()> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::DeleteTask {
                spec_id: spec_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Plan operations ===

    pub async fn create_plan(&self, plan: Plan) -> StateResponse<String> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreatePlan { plan, reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        let result = reply_rx.await.map_err(|_| StateError::ChannelError)?;
        if result.is_ok() {
            notify_state_change();
        }
        result
    }

    pub async fn get_plan(&self, spec_id: &str) -> StateResponse<Option<Plan>> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetPlan {
                spec_id: spec_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn get_plan_required(&self, spec_id: &str) -> Result<Plan, StateError> {
        self.get_plan(spec_id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Plan {}", spec_id)))
    }

    pub async fn update_plan(&self, plan: Plan) -> StateResponse<()> {
        let spec_id = plan.spec_id.clone();
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdatePlan { plan, reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        let result = reply_rx.await.map_err(|_| StateError::ChannelError)?;
        if result.is_ok() {
            let _ = self.event_tx.send(StateEvent::PlanUpdated { spec_id });
            notify_state_change();
        }
        result
    }

    pub async fn delete_plan(&self, spec_id: &str) -> StateResponse<()> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::DeletePlan {
                spec_id: spec_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Maintenance ===

    pub async fn sync(&self) -> StateResponse<()> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::Sync { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn rebuild_indexes(&self) -> StateResponse<usize> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::RebuildIndexes { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn shutdown(&self) -> Result<(), StateError> {
        self.tx.send(StateCommand::Shutdown).await.map_err(|_| StateError::ChannelError)
    }

    /// Aggregated metrics across all tasks, for the Status Bridge snapshot.
    pub async fn get_metrics(&self) -> eyre::Result<DaemonMetrics> {
        let tasks = self.list_tasks(None, None, None).await?;
        let mut metrics = DaemonMetrics::default();

        for task in tasks {
            metrics.total_tasks += 1;
            match task.status {
                TaskStatus::Queue => metrics.queued += 1,
                TaskStatus::InProgress => metrics.in_progress += 1,
                TaskStatus::AiReview => metrics.ai_review += 1,
                TaskStatus::QaFixing => metrics.qa_fixing += 1,
                TaskStatus::HumanReview => metrics.human_review += 1,
                TaskStatus::Done => metrics.done += 1,
                TaskStatus::Error => metrics.error += 1,
            }
        }

        Ok(metrics)
    }
}

/// The actor loop that owns the Store and processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreateTask { task, reply } => {
                let result = store.create(task).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::GetTask { spec_id, reply } => {
                let result: StateResponse<Option<Task>> =
                    store.get(&spec_id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::UpdateTask { task, reply } => {
                let result = store.update(task).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::ListTasks {
                status_filter,
                kind_filter,
                parent_filter,
                reply,
            } => {
                let mut filters = Vec::new();
                if let Some(status) = status_filter {
                    filters.push(Filter {
                        field: "status".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(status),
                    });
                }
                if let Some(kind) = kind_filter {
                    filters.push(Filter {
                        field: "kind".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(kind),
                    });
                }
                if let Some(parent) = parent_filter {
                    filters.push(Filter {
                        field: "parent_task".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(parent),
                    });
                }
                let result: StateResponse<Vec<Task>> =
                    store.list(&filters).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::DeleteTask { spec_id, reply } => {
                let result = store.delete::<Task>(&spec_id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::CreatePlan { plan, reply } => {
                let result = store.create(plan).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::GetPlan { spec_id, reply } => {
                let result: StateResponse<Option<Plan>> =
                    store.get(&spec_id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::UpdatePlan { plan, reply } => {
                let result = store.update(plan).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::DeletePlan { spec_id, reply } => {
                let result = store.delete::<Plan>(&spec_id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::Sync { reply } => {
                let result = store.sync().map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::RebuildIndexes { reply } => {
                let mut count = 0;
                if let Ok(c) = store.rebuild_indexes::<Task>() {
                    count += c;
                }
                if let Ok(c) = store.rebuild_indexes::<Plan>() {
                    count += c;
                }
                let _ = reply.send(Ok(count));
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
