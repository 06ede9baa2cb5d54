//! Agent Registry and Exec Policy
//!
//! The registry is a single in-process map from an agent kind (`"build"`,
//! `"qa_reviewer"`, `"qa_fixer"`, ...) to the [`AgentDefinition`] describing
//! what it is allowed to do. The Exec Policy is the first of four
//! authorization layers evaluated before every bash dispatch; the remaining
//! three (project allowlist hook, session-layer permissions, OS sandbox)
//! live outside this crate and are composed by the caller.

mod definition;
mod policy;
mod registry;

pub use definition::{AgentDefinition, ExecutionMode, ToolProfile};
pub use policy::{ExecPolicy, ExecPolicyError, SecurityLevel};
pub use registry::{AgentRegistry, RegistryError};
