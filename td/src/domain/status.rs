//! The status twin: `status` is the coarse lifecycle label used for
//! admission, `xstateState` is the finer UI-facing label derived from it.
//! Both are written atomically together; a reader seeing divergence treats
//! `xstateState` as authoritative for UI and `status` as authoritative for
//! admission.

use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// The task's current macro-phase. Disambiguates the two `status` values
/// (`in_progress`, `human_review`) that map to more than one `xstateState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Planning,
    Coding,
    /// Plan has been proposed and is awaiting user approval, before coding starts.
    PlanProposed,
    /// Implementation/build finished; awaiting user sign-off.
    BuildComplete,
    Merging,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XstateState {
    Backlog,
    Planning,
    Coding,
    QaReview,
    QaFixing,
    PlanReview,
    HumanReview,
    Done,
    Error,
}

impl std::fmt::Display for XstateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            XstateState::Backlog => "backlog",
            XstateState::Planning => "planning",
            XstateState::Coding => "coding",
            XstateState::QaReview => "qa_review",
            XstateState::QaFixing => "qa_fixing",
            XstateState::PlanReview => "plan_review",
            XstateState::HumanReview => "human_review",
            XstateState::Done => "done",
            XstateState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The fixed `status` + `executionPhase` -> `xstateState` map from the
/// status twin table.
pub fn derive_xstate_state(status: TaskStatus, phase: ExecutionPhase) -> XstateState {
    match status {
        TaskStatus::Queue => XstateState::Backlog,
        TaskStatus::InProgress => match phase {
            ExecutionPhase::Coding | ExecutionPhase::Merging => XstateState::Coding,
            _ => XstateState::Planning,
        },
        TaskStatus::AiReview => XstateState::QaReview,
        TaskStatus::QaFixing => XstateState::QaFixing,
        TaskStatus::HumanReview => match phase {
            ExecutionPhase::PlanProposed => XstateState::PlanReview,
            _ => XstateState::HumanReview,
        },
        TaskStatus::Done => XstateState::Done,
        TaskStatus::Error => XstateState::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_progress_disambiguates_by_phase() {
        assert_eq!(
            derive_xstate_state(TaskStatus::InProgress, ExecutionPhase::Planning),
            XstateState::Planning
        );
        assert_eq!(
            derive_xstate_state(TaskStatus::InProgress, ExecutionPhase::Coding),
            XstateState::Coding
        );
    }

    #[test]
    fn human_review_disambiguates_by_phase() {
        assert_eq!(
            derive_xstate_state(TaskStatus::HumanReview, ExecutionPhase::PlanProposed),
            XstateState::PlanReview
        );
        assert_eq!(
            derive_xstate_state(TaskStatus::HumanReview, ExecutionPhase::BuildComplete),
            XstateState::HumanReview
        );
    }

    #[test]
    fn terminal_statuses_are_phase_independent() {
        assert_eq!(
            derive_xstate_state(TaskStatus::Done, ExecutionPhase::Terminal),
            XstateState::Done
        );
        assert_eq!(
            derive_xstate_state(TaskStatus::Error, ExecutionPhase::Coding),
            XstateState::Error
        );
    }
}
