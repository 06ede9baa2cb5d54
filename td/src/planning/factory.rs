//! Spec Factory: batch child-spec creation for a `design`/`architecture`
//! task (spec.md §4.8).
//!
//! Children arrive with `dependsOn` expressed as 1-based indices into the
//! batch itself. Resolution is two passes: allocate every child's real spec
//! id first (monotonic counter scanned off the specs directory), then
//! rewrite each `dependsOn` entry from a batch index to the real id. The
//! batch's internal dependency graph is checked for cycles with the same
//! DFS-recursion-stack approach the Pipeline Engine uses to layer stages.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{TaskKind, TaskPriority, spec_id as mint_spec_id};

use super::plan_files::{write_child_spec_files, write_parent_plan_children};

/// One child spec as submitted by the calling agent. `depends_on` entries
/// are 1-based indices into the batch (as strings or digits), or a
/// comma-separated string of such indices — both are normalized to a list.
#[derive(Debug, Clone)]
pub struct ChildSpecInput {
    pub task: String,
    pub priority: TaskPriority,
    pub kind: TaskKind,
    pub depends_on: Vec<String>,
    pub files_to_modify: Vec<String>,
    pub acceptance_criteria: Vec<String>,
}

impl ChildSpecInput {
    /// Split a raw comma-separated field (as an agent might emit for
    /// `dependsOn`/`filesToModify`/`acceptanceCriteria`) back into a list.
    pub fn normalize_csv(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum SpecFactoryError {
    #[error("batch child {0} references dependsOn index {1}, which is out of range for a batch of size {2}")]
    IndexOutOfRange(usize, usize, usize),

    #[error("batch dependency graph has a cycle among indices: {0:?}")]
    CycleDetected(Vec<usize>),

    #[error("child {index} is of kind {kind:?}, which may not be created at depth {depth} (maxChildDepth={max})")]
    ChildDepthExceeded {
        index: usize,
        kind: TaskKind,
        depth: u32,
        max: u32,
    },

    #[error("failed to read specs directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize plan file: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Minimal requirements/context documents written alongside each child's
/// plan, per the filesystem layout the daemon's admission scan expects
/// (spec.md §4.10).
#[derive(Debug, Serialize, Deserialize)]
pub struct ChildRequirements {
    pub task: String,
    pub acceptance_criteria: Vec<String>,
    pub files_to_modify: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChildContext {
    pub parent_task: String,
}

/// Creates batches of child specs for a `design`/`architecture` task.
pub struct SpecFactory {
    specs_dir: PathBuf,
}

impl SpecFactory {
    pub fn new(specs_dir: impl Into<PathBuf>) -> Self {
        Self {
            specs_dir: specs_dir.into(),
        }
    }

    /// Scan the specs directory for the highest-numbered existing spec id
    /// and return the next counter value.
    fn next_counter(&self) -> Result<u32, SpecFactoryError> {
        if !self.specs_dir.exists() {
            return Ok(1);
        }
        let mut max_seen = 0u32;
        for entry in std::fs::read_dir(&self.specs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && let Some(counter) = crate::domain::counter_of(name)
            {
                max_seen = max_seen.max(counter);
            }
        }
        Ok(max_seen + 1)
    }

    /// Resolve a batch's 1-based `dependsOn` indices to real spec ids,
    /// reject cycles and depth violations, write each child's spec
    /// directory, and update the parent's plan to record the new children.
    ///
    /// `parent_depth` is the parent task's own depth in the `parentTask`
    /// chain (root tasks are depth 0); children are created at
    /// `parent_depth + 1`.
    pub fn create_batch(
        &self,
        parent_spec_id: &str,
        parent_depth: u32,
        max_child_depth: u32,
        inputs: Vec<ChildSpecInput>,
    ) -> Result<Vec<String>, SpecFactoryError> {
        let child_depth = parent_depth + 1;
        for (i, input) in inputs.iter().enumerate() {
            if input.kind.is_decomposition_only() && child_depth >= max_child_depth {
                return Err(SpecFactoryError::ChildDepthExceeded {
                    index: i + 1,
                    kind: input.kind,
                    depth: child_depth,
                    max: max_child_depth,
                });
            }
        }

        reject_cycles(&inputs)?;

        let mut counter = self.next_counter()?;
        let mut ids = Vec::with_capacity(inputs.len());
        for input in &inputs {
            ids.push(mint_spec_id(counter, &input.task));
            counter += 1;
        }

        let mut resolved_depends_on = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            let mut deps = Vec::with_capacity(input.depends_on.len());
            for raw in &input.depends_on {
                let idx: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| SpecFactoryError::IndexOutOfRange(i + 1, 0, inputs.len()))?;
                if idx == 0 || idx > inputs.len() {
                    return Err(SpecFactoryError::IndexOutOfRange(i + 1, idx, inputs.len()));
                }
                deps.push(ids[idx - 1].clone());
            }
            resolved_depends_on.push(deps);
        }

        for ((input, id), depends_on) in inputs.iter().zip(ids.iter()).zip(resolved_depends_on.iter()) {
            write_child_spec_files(&self.specs_dir, id, parent_spec_id, input, depends_on)?;
        }

        write_parent_plan_children(&self.specs_dir, parent_spec_id, &ids)?;

        Ok(ids)
    }
}

/// DFS cycle detection over the batch's own `dependsOn` graph (1-based
/// indices, resolved to 0-based internally), mirroring the Pipeline
/// Engine's stage-dependency check.
fn reject_cycles(inputs: &[ChildSpecInput]) -> Result<(), SpecFactoryError> {
    let mut graph: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, input) in inputs.iter().enumerate() {
        let mut deps = Vec::new();
        for raw in &input.depends_on {
            if let Ok(idx) = raw.trim().parse::<usize>()
                && idx >= 1
                && idx <= inputs.len()
            {
                deps.push(idx - 1);
            }
        }
        graph.insert(i, deps);
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();
    for i in 0..inputs.len() {
        if !visited.contains(&i) && has_cycle(i, &graph, &mut visited, &mut rec_stack, &mut path) {
            return Err(SpecFactoryError::CycleDetected(path));
        }
    }
    Ok(())
}

fn has_cycle(
    node: usize,
    graph: &HashMap<usize, Vec<usize>>,
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
    path: &mut Vec<usize>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &dep in graph.get(&node).into_iter().flatten() {
        if !visited.contains(&dep) {
            if has_cycle(dep, graph, visited, rec_stack, path) {
                return true;
            }
        } else if rec_stack.contains(&dep) {
            path.push(dep);
            return true;
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}
