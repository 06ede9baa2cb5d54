//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Plan, Task};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Task operations
    CreateTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetTask {
        spec_id: String,
        reply: oneshot::Sender<StateResponse<Option<Task>>>,
    },
    UpdateTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListTasks {
        status_filter: Option<String>,
        kind_filter: Option<String>,
        parent_filter: Option<String>,
        reply: oneshot::Sender<StateResponse<Vec<Task>>>,
    },
    DeleteTask {
        spec_id: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Plan operations
    CreatePlan {
        plan: Plan,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetPlan {
        spec_id: String,
        reply: oneshot::Sender<StateResponse<Option<Plan>>>,
    },
    UpdatePlan {
        plan: Plan,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    DeletePlan {
        spec_id: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Sync operations
    Sync {
        reply: oneshot::Sender<StateResponse<()>>,
    },
    RebuildIndexes {
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // Shutdown
    Shutdown,
}
