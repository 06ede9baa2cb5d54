//! Pipeline Engine — declarative DAG executor for a task's stages.
//!
//! A pipeline is a DAG of [`Stage`]s. The engine topologically orders them
//! and, within a level where several stages have all their dependencies
//! satisfied, runs them concurrently — that's what `parallelGroup` means in
//! practice: a label for a level, not a separate scheduling primitive.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// How many times a transient stage failure is retried, and the backoff
/// between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max: 0, backoff_ms: 0 }
    }
}

/// Everything a stage action needs: the working directory it should
/// operate in, the task it belongs to, a cooperative cancellation signal,
/// and the resolved agent policy for this turn.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub spec_id: String,
    pub working_dir: std::path::PathBuf,
    pub spec_dir: std::path::PathBuf,
    pub cancel: watch::Receiver<bool>,
}

impl PipelineContext {
    pub fn new(spec_id: impl Into<String>, working_dir: std::path::PathBuf, spec_dir: std::path::PathBuf) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            spec_id: spec_id.into(),
            working_dir,
            spec_dir,
            cancel: rx,
        }
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether cancellation has been requested. Actions must check this at
    /// every suspension boundary (the engine only checks between stages).
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// A stage failure, distinguishing transient (retryable) from permanent
/// failures per spec's retry contract.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub message: String,
    pub transient: bool,
}

impl StageFailure {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

/// What a stage actually does, given the context. Implementations hold
/// whatever handles they need (a `QaLoop`, a `WorktreeManager`, ...).
#[async_trait]
pub trait StageAction: Send + Sync {
    async fn run(&self, ctx: &PipelineContext) -> Result<(), StageFailure>;
}

/// A no-op action, useful for stages whose topology matters but whose
/// behavior is supplied elsewhere (tests, or a pipeline skeleton awaiting
/// real wiring).
pub struct NoopAction;

#[async_trait]
impl StageAction for NoopAction {
    async fn run(&self, _ctx: &PipelineContext) -> Result<(), StageFailure> {
        Ok(())
    }
}

/// One node in the stage DAG.
pub struct Stage {
    pub name: String,
    pub depends_on: Vec<String>,
    pub parallel_group: Option<String>,
    pub retry: RetryPolicy,
    pub condition: Option<Arc<dyn Fn(&PipelineContext) -> bool + Send + Sync>>,
    pub action: Arc<dyn StageAction>,
}

impl Stage {
    pub fn new(name: impl Into<String>, action: Arc<dyn StageAction>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            parallel_group: None,
            retry: RetryPolicy::default(),
            condition: None,
            action,
        }
    }

    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn parallel_group(mut self, group: impl Into<String>) -> Self {
        self.parallel_group = Some(group.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn condition(mut self, predicate: Arc<dyn Fn(&PipelineContext) -> bool + Send + Sync>) -> Self {
        self.condition = Some(predicate);
        self
    }
}

/// The outcome of running one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failed { message: String },
    Skipped,
    Cancelled,
}

/// A completed stage's record, as it would be written to the event log.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub name: String,
    pub outcome: StageOutcome,
    pub attempts: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dependency cycle detected among stages: {0:?}")]
    CycleDetected(Vec<String>),
    #[error("stage `{stage}` depends on unknown stage `{dep}`")]
    UnknownDependency { stage: String, dep: String },
    #[error("stage `{name}` failed: {message}")]
    StageFailed { name: String, message: String },
    #[error("pipeline cancelled before completion")]
    Cancelled,
    #[error("no action supplied for stage `{0}`")]
    MissingAction(String),
}

/// Topologically orders stages into levels: each level is the maximal set
/// of not-yet-run stages whose dependencies are all already resolved in an
/// earlier level. Levels run sequentially; stages within a level run
/// concurrently. Cycle detection follows the same DFS-recursion-stack
/// approach as the daemon's loop-dependency validator.
fn layer_stages(stages: &[Stage]) -> Result<Vec<Vec<usize>>, PipelineError> {
    let index_of: HashMap<&str, usize> = stages.iter().enumerate().map(|(i, s)| (s.name.as_str(), i)).collect();

    for stage in stages {
        for dep in &stage.depends_on {
            if !index_of.contains_key(dep.as_str()) {
                return Err(PipelineError::UnknownDependency {
                    stage: stage.name.clone(),
                    dep: dep.clone(),
                });
            }
        }
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut cycle_path = Vec::new();
    for stage in stages {
        if !visited.contains(stage.name.as_str())
            && has_cycle(stage.name.as_str(), stages, &index_of, &mut visited, &mut rec_stack, &mut cycle_path)
        {
            return Err(PipelineError::CycleDetected(cycle_path));
        }
    }

    let mut resolved: HashSet<usize> = HashSet::new();
    let mut levels = Vec::new();
    while resolved.len() < stages.len() {
        let level: Vec<usize> = stages
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                !resolved.contains(i) && s.depends_on.iter().all(|d| resolved.contains(&index_of[d.as_str()]))
            })
            .map(|(i, _)| i)
            .collect();
        if level.is_empty() {
            // Cycle detection above should have caught this; defensive fallback.
            return Err(PipelineError::CycleDetected(
                stages.iter().map(|s| s.name.clone()).collect(),
            ));
        }
        for &i in &level {
            resolved.insert(i);
        }
        levels.push(level);
    }
    Ok(levels)
}

fn has_cycle<'a>(
    node: &'a str,
    stages: &'a [Stage],
    index_of: &HashMap<&'a str, usize>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    cycle_path: &mut Vec<String>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    cycle_path.push(node.to_string());

    let stage = &stages[index_of[node]];
    for dep in &stage.depends_on {
        let dep = dep.as_str();
        if !visited.contains(dep) {
            if has_cycle(dep, stages, index_of, visited, rec_stack, cycle_path) {
                return true;
            }
        } else if rec_stack.contains(dep) {
            cycle_path.push(dep.to_string());
            return true;
        }
    }

    rec_stack.remove(node);
    cycle_path.pop();
    false
}

/// Runs a DAG of stages to completion or first permanent failure.
pub struct PipelineEngine;

impl PipelineEngine {
    pub fn new() -> Self {
        Self
    }

    /// Execute every stage in dependency order, honoring conditions, retry,
    /// and cooperative cancellation. Stops at the first stage whose outcome
    /// is a permanent failure (after exhausting retries); stages already
    /// completed keep their results.
    pub async fn run(&self, stages: Vec<Stage>, ctx: &PipelineContext) -> Result<Vec<StageResult>, PipelineError> {
        let levels = layer_stages(&stages)?;
        let stages = Arc::new(stages);
        let mut results = Vec::with_capacity(stages.len());

        for level in levels {
            if ctx.is_cancelled() {
                for &i in &level {
                    results.push(StageResult {
                        name: stages[i].name.clone(),
                        outcome: StageOutcome::Cancelled,
                        attempts: 0,
                        duration_ms: 0,
                    });
                }
                return Err(PipelineError::Cancelled);
            }

            let mut handles = Vec::with_capacity(level.len());
            for &i in &level {
                let stages = stages.clone();
                let ctx = ctx.clone();
                handles.push(tokio::spawn(async move { run_one(&stages[i], &ctx).await }));
            }

            let mut level_failed = None;
            for handle in handles {
                let result = handle.await.map_err(|e| PipelineError::StageFailed {
                    name: "<join>".to_string(),
                    message: e.to_string(),
                })?;
                if let StageOutcome::Failed { ref message } = result.outcome {
                    level_failed.get_or_insert_with(|| (result.name.clone(), message.clone()));
                }
                results.push(result);
            }

            if let Some((name, message)) = level_failed {
                return Err(PipelineError::StageFailed { name, message });
            }
        }

        Ok(results)
    }
}

impl Default for PipelineEngine {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_one(stage: &Stage, ctx: &PipelineContext) -> StageResult {
    let start = Instant::now();

    if let Some(condition) = &stage.condition
        && !condition(ctx)
    {
        debug!(stage = %stage.name, "run_one: condition false, skipping");
        return StageResult {
            name: stage.name.clone(),
            outcome: StageOutcome::Skipped,
            attempts: 0,
            duration_ms: start.elapsed().as_millis() as u64,
        };
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        if ctx.is_cancelled() {
            return StageResult {
                name: stage.name.clone(),
                outcome: StageOutcome::Cancelled,
                attempts,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }

        match stage.action.run(ctx).await {
            Ok(()) => {
                return StageResult {
                    name: stage.name.clone(),
                    outcome: StageOutcome::Success,
                    attempts,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Err(failure) if failure.transient && attempts <= stage.retry.max => {
                warn!(stage = %stage.name, attempts, error = %failure.message, "run_one: transient failure, retrying");
                tokio::time::sleep(Duration::from_millis(stage.retry.backoff_ms)).await;
                continue;
            }
            Err(failure) => {
                return StageResult {
                    name: stage.name.clone(),
                    outcome: StageOutcome::Failed { message: failure.message },
                    attempts,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        }
    }
}
