//! The `Plan`: a task's on-disk twin, `implementation_plan.json`.
//!
//! Structure and invariants per the plan schema: `phases`/subtask lists are
//! never present for `design`/`architecture` kinds, and `xstateState` is
//! always the pure derivation of `(status, executionPhase)` rather than a
//! field the pipeline sets independently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};
use taskstore::{IndexValue, Record, now_ms};

use super::priority::TaskPriority;
use super::status::{ExecutionPhase, XstateState, derive_xstate_state};
use super::task::{TaskKind, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    pub status: SubtaskStatus,
    #[serde(default)]
    pub files_to_create: Vec<String>,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignoffStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaSignoff {
    pub status: SignoffStatus,
    #[serde(default)]
    pub issues: Vec<String>,
    pub report_file: Option<String>,
}

impl Default for QaSignoff {
    fn default() -> Self {
        Self {
            status: SignoffStatus::Pending,
            issues: Vec::new(),
            report_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanError {
    pub kind: String,
    /// First 200 characters of the diagnostic, per the error-surfacing rule.
    pub diagnostic: String,
}

/// A task's persisted plan document, `implementation_plan.json`.
///
/// `Serialize` is implemented by hand (see [`PlanJson`]) rather than
/// derived: the on-disk schema carries `xstateState`, which is never a
/// field here — it is always the pure derivation of `(status,
/// executionPhase)` via [`Plan::xstate_state`], recomputed on every write
/// rather than stored and risking drift.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub spec_id: String,
    pub status: TaskStatus,
    pub execution_phase: ExecutionPhase,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub parent_task: Option<String>,
    /// Absent for `design`/`architecture` kinds.
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub qa_signoff: QaSignoff,
    pub worktree_path: Option<String>,
    #[serde(default)]
    pub errors: Vec<PlanError>,
    pub updated_at: i64,
}

/// Shadow DTO carrying the bit-stable on-disk shape, including the derived
/// `xstateState` field `Plan` itself never stores.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanJson<'a> {
    spec_id: &'a str,
    status: TaskStatus,
    xstate_state: XstateState,
    execution_phase: ExecutionPhase,
    kind: TaskKind,
    priority: TaskPriority,
    depends_on: &'a [String],
    parent_task: &'a Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    phases: &'a [Phase],
    qa_signoff: &'a QaSignoff,
    worktree_path: &'a Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: &'a [PlanError],
    updated_at: i64,
}

impl Serialize for Plan {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        PlanJson {
            spec_id: &self.spec_id,
            status: self.status,
            xstate_state: self.xstate_state(),
            execution_phase: self.execution_phase,
            kind: self.kind,
            priority: self.priority,
            depends_on: &self.depends_on,
            parent_task: &self.parent_task,
            phases: &self.phases,
            qa_signoff: &self.qa_signoff,
            worktree_path: &self.worktree_path,
            errors: &self.errors,
            updated_at: self.updated_at,
        }
        .serialize(serializer)
    }
}

impl Plan {
    pub fn new(spec_id: impl Into<String>, kind: TaskKind, priority: TaskPriority) -> Self {
        Self {
            spec_id: spec_id.into(),
            status: TaskStatus::Queue,
            execution_phase: ExecutionPhase::Planning,
            kind,
            priority,
            depends_on: Vec::new(),
            parent_task: None,
            phases: Vec::new(),
            qa_signoff: QaSignoff::default(),
            worktree_path: None,
            errors: Vec::new(),
            updated_at: now_ms(),
        }
    }

    pub fn xstate_state(&self) -> XstateState {
        derive_xstate_state(self.status, self.execution_phase)
    }

    /// `phases`/subtasks must never be populated for decomposition-only kinds.
    pub fn validate_schema(&self) -> Result<(), String> {
        if self.kind.is_decomposition_only() && !self.phases.is_empty() {
            return Err(format!(
                "plan {} of kind {:?} must not carry phases",
                self.spec_id, self.kind
            ));
        }
        Ok(())
    }

    /// True once the build/implementation side has finished and the task is
    /// waiting on the human sign-off that auto-verify keys off of.
    pub fn is_awaiting_signoff(&self) -> bool {
        self.xstate_state() == XstateState::HumanReview && self.execution_phase == ExecutionPhase::BuildComplete
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn set_phase(&mut self, phase: ExecutionPhase) {
        self.execution_phase = phase;
        self.updated_at = now_ms();
    }

    pub fn push_error(&mut self, kind: impl Into<String>, diagnostic: &str) {
        let truncated: String = diagnostic.chars().take(200).collect();
        self.errors.push(PlanError {
            kind: kind.into(),
            diagnostic: truncated,
        });
        self.updated_at = now_ms();
    }
}

impl Record for Plan {
    fn id(&self) -> &str {
        &self.spec_id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "plans"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert(
            "xstate_state".to_string(),
            IndexValue::String(self.xstate_state().to_string()),
        );
        if let Some(parent) = &self.parent_task {
            fields.insert("parent_task".to_string(), IndexValue::String(parent.clone()));
        }
        fields
    }
}
