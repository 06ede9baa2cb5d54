//! The `Task` record: one unit of work tracked by the daemon.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};

use super::priority::TaskPriority;
use super::status::{ExecutionPhase, XstateState, derive_xstate_state};

/// The kind of work a task performs. Determines which pipeline it runs
/// under and whether it may spawn `design`/`architecture` children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Impl,
    Frontend,
    Backend,
    Database,
    Api,
    Test,
    Integration,
    Docs,
    Design,
    Architecture,
    Research,
    Review,
    Planning,
    Verify,
    ErrorCheck,
    Mcts,
}

impl TaskKind {
    /// Kinds whose successful completion triggers an automatic `verify` child
    /// (see the Task Daemon's auto-verify algorithm).
    pub fn auto_verifies(self) -> bool {
        matches!(
            self,
            TaskKind::Impl | TaskKind::Frontend | TaskKind::Backend | TaskKind::Database | TaskKind::Api
        )
    }

    /// Kinds that never carry `phases`/subtasks in their plan.
    pub fn is_decomposition_only(self) -> bool {
        matches!(self, TaskKind::Design | TaskKind::Architecture)
    }
}

/// Coarse lifecycle label. Several historical spellings are accepted on
/// read (`queue`/`backlog`/`queued`, `done`/`completed`, `error`/`failed`)
/// but always written back out in their canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(alias = "backlog", alias = "queued")]
    Queue,
    InProgress,
    AiReview,
    QaFixing,
    #[serde(alias = "human_review")]
    HumanReview,
    #[serde(alias = "completed")]
    Done,
    #[serde(alias = "failed")]
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }

    pub fn is_queued(self) -> bool {
        matches!(self, TaskStatus::Queue)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queue => "queue",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::AiReview => "ai_review",
            TaskStatus::QaFixing => "qa_fixing",
            TaskStatus::HumanReview => "human_review",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One unit of work scheduled by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// `NNN-slug`, unique within the project, stable for the task's lifetime.
    pub spec_id: String,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub depends_on: Vec<String>,
    pub parent_task: Option<String>,
    pub status: TaskStatus,
    pub execution_phase: ExecutionPhase,
    pub recovery_count: u32,
    /// Consecutive worktree-acquisition failures, distinct from
    /// `recovery_count` (spec.md §4.1 Failure semantics: "after three
    /// consecutive failures mark error"). Reset to 0 on any successful
    /// acquisition.
    #[serde(default)]
    pub worktree_fail_count: u32,
    /// When the most recent worktree-acquisition failure happened, gating
    /// re-admission for 60s (spec.md §4.1). `None` once acquisition
    /// succeeds.
    #[serde(default)]
    pub last_worktree_failure_ms: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(spec_id: impl Into<String>, kind: TaskKind, priority: TaskPriority) -> Self {
        let now = now_ms();
        Self {
            spec_id: spec_id.into(),
            kind,
            priority,
            depends_on: Vec::new(),
            parent_task: None,
            status: TaskStatus::Queue,
            execution_phase: ExecutionPhase::Planning,
            recovery_count: 0,
            worktree_fail_count: 0,
            last_worktree_failure_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_task = Some(parent.into());
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    /// The paired UI-facing label, derived from `(status, executionPhase)`.
    pub fn xstate_state(&self) -> XstateState {
        derive_xstate_state(self.status, self.execution_phase)
    }

    /// Eligible for admission: queued, under the recovery cap, and every
    /// dependency already terminal-successful. `done_specs` is the caller's
    /// view of which specIds have reached `status=done`.
    pub fn is_eligible(&self, done_specs: &std::collections::HashSet<String>, max_recovery: u32) -> bool {
        self.status.is_queued()
            && self.recovery_count < max_recovery
            && self.depends_on.iter().all(|dep| done_specs.contains(dep))
    }

    pub fn transition(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn set_phase(&mut self, phase: ExecutionPhase) {
        self.execution_phase = phase;
        self.updated_at = now_ms();
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.spec_id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert(
            "kind".to_string(),
            IndexValue::String(serde_json::to_value(self.kind).unwrap().as_str().unwrap().to_string()),
        );
        if let Some(parent) = &self.parent_task {
            fields.insert("parent_task".to_string(), IndexValue::String(parent.clone()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn new_task_starts_queued_at_priority_default() {
        let task = Task::new("001-add-login", TaskKind::Impl, TaskPriority::new(2));
        assert_eq!(task.status, TaskStatus::Queue);
        assert_eq!(task.recovery_count, 0);
    }

    #[test]
    fn eligibility_requires_dependencies_done() {
        let mut task = Task::new("002-b", TaskKind::Impl, TaskPriority::new(1)).with_depends_on(vec!["001-a".into()]);
        let mut done = HashSet::new();
        assert!(!task.is_eligible(&done, 3));

        done.insert("001-a".to_string());
        assert!(task.is_eligible(&done, 3));

        task.recovery_count = 3;
        assert!(!task.is_eligible(&done, 3));
    }

    #[test]
    fn status_aliases_deserialize_to_canonical_form() {
        let task: Task = serde_json::from_str(
            r#"{"spec_id":"001-x","kind":"impl","priority":2,"depends_on":[],"parent_task":null,
                "status":"backlog","execution_phase":"planning","recovery_count":0,
                "created_at":0,"updated_at":0}"#,
        )
        .unwrap();
        assert_eq!(task.status, TaskStatus::Queue);
    }

    #[test]
    fn auto_verifies_only_for_buildable_kinds() {
        assert!(TaskKind::Impl.auto_verifies());
        assert!(!TaskKind::Design.auto_verifies());
        assert!(!TaskKind::Verify.auto_verifies());
    }
}
