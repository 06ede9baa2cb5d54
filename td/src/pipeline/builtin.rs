//! Built-in pipeline topologies.
//!
//! These name the stage DAG for each of the daemon's standard task
//! shapes. They carry no behavior themselves — [`built_in_pipeline`]
//! attaches caller-supplied [`StageAction`]s by name, so the Task Daemon
//! decides what `build`/`qa`/`merge` actually do (run an agent session,
//! drive the QA Loop, call `worktree::merge_to_main`) without the engine
//! needing to know about any of those concrete types.

use std::collections::HashMap;
use std::sync::Arc;

use super::engine::{PipelineError, RetryPolicy, Stage, StageAction};

/// One of the daemon's standard pipeline shapes (spec.md §4.2's built-in
/// pipelines table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinPipeline {
    /// `build` -> `qa` (if not `skipQA`) -> `merge`
    Default,
    /// `decompose`
    Design,
    /// `qa`
    QaOnly,
    /// `mcts_search` -> `merge_best`
    Mcts,
}

impl BuiltinPipeline {
    /// Stage names this pipeline needs an action for, in no particular
    /// order (the DAG order comes from each stage's `depends_on`).
    pub fn stage_names(&self) -> &'static [&'static str] {
        match self {
            Self::Default => &["build", "qa", "merge"],
            Self::Design => &["decompose"],
            Self::QaOnly => &["qa"],
            Self::Mcts => &["mcts_search", "merge_best"],
        }
    }
}

/// Build the stage list for a built-in pipeline, attaching the caller's
/// actions by name. `skip_qa` elides the `qa` stage from [`BuiltinPipeline::Default`]
/// (its `merge` stage then depends directly on `build`).
///
/// Returns an error naming the first stage with no supplied action.
pub fn built_in_pipeline(
    kind: BuiltinPipeline,
    mut actions: HashMap<&'static str, Arc<dyn StageAction>>,
    skip_qa: bool,
) -> Result<Vec<Stage>, PipelineError> {
    let take = |actions: &mut HashMap<&'static str, Arc<dyn StageAction>>, name: &'static str| {
        actions.remove(name).ok_or_else(|| PipelineError::MissingAction(name.to_string()))
    };

    let stages = match kind {
        BuiltinPipeline::Default => {
            let build = Stage::new("build", take(&mut actions, "build")?);
            if skip_qa {
                let merge = Stage::new("merge", take(&mut actions, "merge")?).depends_on(["build"]);
                vec![build, merge]
            } else {
                let qa = Stage::new("qa", take(&mut actions, "qa")?)
                    .depends_on(["build"])
                    .retry(RetryPolicy { max: 1, backoff_ms: 0 });
                let merge = Stage::new("merge", take(&mut actions, "merge")?).depends_on(["qa"]);
                vec![build, qa, merge]
            }
        }
        BuiltinPipeline::Design => {
            vec![Stage::new("decompose", take(&mut actions, "decompose")?)]
        }
        BuiltinPipeline::QaOnly => {
            vec![Stage::new("qa", take(&mut actions, "qa")?)]
        }
        BuiltinPipeline::Mcts => {
            let search = Stage::new("mcts_search", take(&mut actions, "mcts_search")?);
            let merge = Stage::new("merge_best", take(&mut actions, "merge_best")?).depends_on(["mcts_search"]);
            vec![search, merge]
        }
    };

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::engine::NoopAction;

    fn noop_actions(names: &[&'static str]) -> HashMap<&'static str, Arc<dyn StageAction>> {
        names.iter().map(|n| (*n, Arc::new(NoopAction) as Arc<dyn StageAction>)).collect()
    }

    #[test]
    fn default_pipeline_has_build_qa_merge_in_order() {
        let stages = built_in_pipeline(BuiltinPipeline::Default, noop_actions(&["build", "qa", "merge"]), false).unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["build", "qa", "merge"]);
        assert_eq!(stages[1].depends_on, vec!["build"]);
        assert_eq!(stages[2].depends_on, vec!["qa"]);
    }

    #[test]
    fn skip_qa_merges_directly_after_build() {
        let stages = built_in_pipeline(BuiltinPipeline::Default, noop_actions(&["build", "merge"]), true).unwrap();
        let merge = stages.iter().find(|s| s.name == "merge").unwrap();
        assert_eq!(merge.depends_on, vec!["build"]);
    }

    #[test]
    fn missing_action_is_an_error() {
        let result = built_in_pipeline(BuiltinPipeline::QaOnly, HashMap::new(), false);
        assert!(result.is_err());
    }
}
