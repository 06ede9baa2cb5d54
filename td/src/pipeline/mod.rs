//! Pipeline Engine — declarative DAG executor for a task's stages
//! (spec.md §4.2). See [`engine`] for the executor and [`builtin`] for the
//! daemon's standard stage topologies.

mod actions;
mod builtin;
mod engine;

pub use actions::{BuildAction, MergeAction, QaAction};
pub use builtin::{BuiltinPipeline, built_in_pipeline};
pub use engine::{
    NoopAction, PipelineContext, PipelineEngine, PipelineError, RetryPolicy, Stage, StageAction, StageFailure,
    StageOutcome, StageResult,
};
