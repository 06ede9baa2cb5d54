//! Domain types for TaskDaemon.
//!
//! Core entities: `Task` (the unit of work scheduled by the daemon) and its
//! on-disk twin `Plan`, the status/xstateState twin, the append-only `Event`
//! log record, and spec id generation. `Task` and `Plan` implement `Record`
//! for TaskStore persistence.

mod event;
mod id;
mod plan;
mod priority;
mod status;
mod task;

pub use event::{Event, EventKind};
pub use id::{counter_of, slugify, spec_id};
pub use plan::{Phase, Plan, PlanError, QaSignoff, SignoffStatus, Subtask, SubtaskStatus};
pub use priority::TaskPriority;
pub use status::{ExecutionPhase, XstateState, derive_xstate_state};
pub use task::{Task, TaskKind, TaskStatus};

// Re-export taskstore types for convenience
pub use taskstore::{Filter, FilterOp, IndexValue, Record, Store};
