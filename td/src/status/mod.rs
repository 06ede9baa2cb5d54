//! Status Bridge (spec.md §4.9): publishes the daemon's running state both
//! as an atomically-written file (`snapshot`) and as a WebSocket push feed
//! (`bridge`), so editor extensions and CLIs can observe daemon activity
//! without polling the task store directly.

mod bridge;
mod snapshot;

pub use bridge::StatusBridge;
pub use snapshot::{DaemonSnapshot, DaemonStats, QueuedTaskInfo, RunningTaskInfo};
