//! Concrete [`StageAction`]s wiring the Pipeline Engine to the rest of the
//! daemon: one non-agentic LLM completion for `build`, the QA Loop for
//! `qa`, and `worktree::merge_to_main` for `merge`.
//!
//! Agent Session's concrete transport (tool dispatch, multi-turn
//! conversation, streaming) is out of scope here; `BuildAction` drives the
//! LLM client directly with a single completion request, which is enough
//! to exercise the pipeline end to end without inventing the harness.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::validation::{ProjectCapabilities, QaLoop, ReviewVerdict, ValidatorContext};
use crate::worktree::merge_to_main;

use super::engine::{PipelineContext, StageAction, StageFailure};

/// Runs one non-agentic LLM completion against the task's spec, writing the
/// response to `build_output.md` in the worktree.
pub struct BuildAction {
    pub llm: Arc<dyn LlmClient>,
    pub max_tokens: u32,
}

#[async_trait::async_trait]
impl StageAction for BuildAction {
    async fn run(&self, ctx: &PipelineContext) -> Result<(), StageFailure> {
        let spec_path = ctx.spec_dir.join("SPEC.md");
        let task_description = tokio::fs::read_to_string(&spec_path)
            .await
            .unwrap_or_else(|_| format!("Implement task {}", ctx.spec_id));

        let request = CompletionRequest {
            system_prompt: "You are the build stage of an autonomous task pipeline. Describe the \
                            implementation you would make for this task."
                .to_string(),
            messages: vec![Message::user(task_description)],
            tools: Vec::new(),
            max_tokens: self.max_tokens,
        };

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| StageFailure::transient(format!("llm completion failed: {e}")))?;

        let content = response.content.unwrap_or_default();
        let output_path = ctx.working_dir.join("build_output.md");
        tokio::fs::write(&output_path, content)
            .await
            .map_err(|e| StageFailure::permanent(format!("failed to write build output: {e}")))?;

        info!(spec_id = %ctx.spec_id, ?output_path, "build stage wrote output");
        Ok(())
    }
}

/// Runs the QA Loop against the task's worktree. Approval resolves the
/// stage; a non-progressing or capped run is a permanent failure (the daemon
/// surfaces `qaSignoff.status = needs_attention` for human review rather
/// than retrying automatically).
pub struct QaAction {
    pub qa_loop: Arc<QaLoop>,
    pub capabilities: ProjectCapabilities,
}

#[async_trait::async_trait]
impl StageAction for QaAction {
    async fn run(&self, ctx: &PipelineContext) -> Result<(), StageFailure> {
        let context = ValidatorContext::new(ctx.spec_id.clone(), ctx.working_dir.clone(), ctx.spec_dir.clone())
            .with_capabilities(self.capabilities);

        let outcome = self
            .qa_loop
            .run(
                &context,
                |evidence| async move {
                    if evidence.iter().all(|e| e.passed) {
                        ReviewVerdict::Approved
                    } else {
                        let issues = evidence
                            .iter()
                            .filter(|e| !e.passed)
                            .map(|e| e.summary.clone())
                            .collect();
                        ReviewVerdict::Rejected {
                            issues,
                            severity: "blocking".to_string(),
                        }
                    }
                },
                |issues| async move {
                    warn!(?issues, "qa stage has no automated fixer; issues left for human review");
                },
            )
            .await;

        match outcome {
            crate::validation::QaLoopOutcome::Approved { iterations, .. } => {
                info!(spec_id = %ctx.spec_id, iterations, "qa stage approved");
                Ok(())
            }
            crate::validation::QaLoopOutcome::NeedsAttention { iterations, issue_history } => {
                Err(StageFailure::permanent(format!(
                    "qa needs attention after {iterations} iterations: {issue_history:?}"
                )))
            }
        }
    }
}

/// Merges the task's worktree branch back into main.
pub struct MergeAction {
    pub repo_root: PathBuf,
    pub main_branch: String,
}

#[async_trait::async_trait]
impl StageAction for MergeAction {
    async fn run(&self, ctx: &PipelineContext) -> Result<(), StageFailure> {
        let result = merge_to_main(
            &self.repo_root,
            &ctx.working_dir,
            &ctx.spec_id,
            &self.main_branch,
            &ctx.spec_id,
        )
        .await
        .map_err(|e| StageFailure::transient(format!("merge failed: {e}")))?;

        if result.is_success() {
            info!(spec_id = %ctx.spec_id, "merge stage succeeded");
            Ok(())
        } else {
            Err(StageFailure::permanent(
                result.error_message().unwrap_or("merge failed").to_string(),
            ))
        }
    }
}
