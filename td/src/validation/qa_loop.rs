//! QA Loop
//!
//! Iterates review → fix → re-review against validator evidence until the
//! work is approved or the iteration cap is reached. The loop owns
//! orchestration (build-first, then the rest in parallel); it never decides
//! pass/fail itself — that is the validators' and the reviewer's job.
//!
//! The reviewer and fixer are not concrete LLM calls here: the daemon's
//! Agent Session abstraction sits behind the `reviewer`/`fixer` closures so
//! this loop has no dependency on a transport.

use std::future::Future;

use futures::future::join_all;
use serde_json::json;
use tracing::{info, warn};

use super::{ProjectCapabilities, Validator, ValidatorContext, ValidatorResult};

/// What the QA Reviewer decided about one iteration's evidence.
#[derive(Debug, Clone)]
pub enum ReviewVerdict {
    Approved,
    Rejected { issues: Vec<String>, severity: String },
}

#[derive(Debug, Clone)]
pub struct QaLoopConfig {
    /// Iteration cap. Default 3, per the daemon's review/fix convergence policy.
    pub max_iterations: u32,
}

impl Default for QaLoopConfig {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

/// Final disposition of a QA Loop run.
#[derive(Debug, Clone)]
pub enum QaLoopOutcome {
    /// Reviewer approved; caller should set `qaSignoff.status = approved`
    /// and transition the task to `human_review`.
    Approved { iterations: u32, evidence: Vec<ValidatorResult> },
    /// Iteration cap exceeded, or two consecutive iterations produced
    /// byte-identical fix requests (non-progressing). Caller should set
    /// `qaSignoff.status = needs_attention` and preserve `issue_history`.
    NeedsAttention { iterations: u32, issue_history: Vec<Vec<String>> },
}

pub struct QaLoop {
    validators: Vec<Box<dyn Validator>>,
    config: QaLoopConfig,
}

impl QaLoop {
    pub fn new(validators: Vec<Box<dyn Validator>>, config: QaLoopConfig) -> Self {
        Self { validators, config }
    }

    fn selected(&self, capabilities: &ProjectCapabilities) -> Vec<&dyn Validator> {
        self.validators
            .iter()
            .map(|v| v.as_ref())
            .filter(|v| v.selectable(capabilities))
            .collect()
    }

    /// Run the loop to completion.
    ///
    /// `reviewer` is invoked with the iteration's validator evidence and
    /// returns a verdict; `fixer` is invoked with the reviewer's issue list
    /// and is expected to commit fixes into the worktree before returning.
    pub async fn run<R, RFut, F, FFut>(&self, context: &ValidatorContext, reviewer: R, fixer: F) -> QaLoopOutcome
    where
        R: Fn(Vec<ValidatorResult>) -> RFut,
        RFut: Future<Output = ReviewVerdict>,
        F: Fn(&[String]) -> FFut,
        FFut: Future<Output = ()>,
    {
        let selected = self.selected(&context.capabilities);
        let build_validator = selected.iter().find(|v| v.name() == "build").copied();
        let runtime_validators: Vec<&dyn Validator> = selected.iter().filter(|v| v.name() != "build").copied().collect();

        let mut issue_history: Vec<Vec<String>> = Vec::new();
        let mut previous_fix_request: Option<String> = None;

        for iteration in 1..=self.config.max_iterations {
            info!(spec_id = %context.spec_id, iteration, "QaLoop::run: starting iteration");

            let mut evidence = Vec::new();
            let mut build_failed = false;

            if let Some(build_validator) = build_validator {
                let result = build_validator.run(context).await;
                build_failed = !result.passed && !result.skipped;
                evidence.push(result);
            }

            if !build_failed {
                let runtime_results = join_all(runtime_validators.iter().map(|v| v.run(context))).await;
                evidence.extend(runtime_results);
            }

            let verdict = reviewer(evidence.clone()).await;

            match verdict {
                ReviewVerdict::Approved => {
                    info!(spec_id = %context.spec_id, iteration, "QaLoop::run: approved");
                    return QaLoopOutcome::Approved {
                        iterations: iteration,
                        evidence,
                    };
                }
                ReviewVerdict::Rejected { issues, severity } => {
                    let fix_request = Self::render_fix_request(&issues, &severity, &evidence);

                    if previous_fix_request.as_deref() == Some(fix_request.as_str()) {
                        warn!(spec_id = %context.spec_id, iteration, "QaLoop::run: non-progressing fix request, stopping");
                        issue_history.push(issues);
                        return QaLoopOutcome::NeedsAttention {
                            iterations: iteration,
                            issue_history,
                        };
                    }

                    if let Err(e) = Self::write_fix_request(context, &fix_request).await {
                        warn!(spec_id = %context.spec_id, error = %e, "QaLoop::run: failed to write QA_FIX_REQUEST");
                    }

                    issue_history.push(issues.clone());
                    previous_fix_request = Some(fix_request);

                    if iteration == self.config.max_iterations {
                        warn!(spec_id = %context.spec_id, "QaLoop::run: iteration cap exceeded without approval");
                        return QaLoopOutcome::NeedsAttention {
                            iterations: iteration,
                            issue_history,
                        };
                    }

                    fixer(&issues).await;
                }
            }
        }

        QaLoopOutcome::NeedsAttention {
            iterations: self.config.max_iterations,
            issue_history,
        }
    }

    fn render_fix_request(issues: &[String], severity: &str, evidence: &[ValidatorResult]) -> String {
        let mut out = format!("# QA Fix Request\n\nSeverity: {}\n\n## Issues\n", severity);
        for issue in issues {
            out.push_str("- ");
            out.push_str(issue);
            out.push('\n');
        }
        out.push_str("\n## Validator evidence\n");
        for result in evidence {
            out.push_str(&format!(
                "- {}: {}{}\n",
                result.validator,
                if result.skipped {
                    "skipped"
                } else if result.passed {
                    "passed"
                } else {
                    "failed"
                },
                if result.summary.is_empty() {
                    String::new()
                } else {
                    format!(" — {}", result.summary)
                }
            ));
        }
        out
    }

    async fn write_fix_request(context: &ValidatorContext, content: &str) -> std::io::Result<()> {
        let path = context.spec_dir.join("QA_FIX_REQUEST.md");
        tokio::fs::write(path, content).await
    }
}

#[allow(dead_code)]
fn evidence_summary(evidence: &[ValidatorResult]) -> serde_json::Value {
    json!(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::BuildValidator;

    #[tokio::test]
    async fn approves_immediately_when_reviewer_approves() {
        let temp = tempfile::tempdir().unwrap();
        let qa_loop = QaLoop::new(vec![Box::new(BuildValidator::new())], QaLoopConfig::default());
        let ctx = ValidatorContext::new("001-example", temp.path(), temp.path());

        let outcome = qa_loop
            .run(
                &ctx,
                |_evidence| async { ReviewVerdict::Approved },
                |_issues| async {},
            )
            .await;

        match outcome {
            QaLoopOutcome::Approved { iterations, .. } => assert_eq!(iterations, 1),
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stops_at_iteration_cap_without_approval() {
        let temp = tempfile::tempdir().unwrap();
        let qa_loop = QaLoop::new(
            vec![Box::new(BuildValidator::new())],
            QaLoopConfig { max_iterations: 2 },
        );
        let ctx = ValidatorContext::new("001-example", temp.path(), temp.path());

        let outcome = qa_loop
            .run(
                &ctx,
                |_evidence| async {
                    ReviewVerdict::Rejected {
                        issues: vec!["still broken".into()],
                        severity: "high".into(),
                    }
                },
                |_issues| async {},
            )
            .await;

        match outcome {
            QaLoopOutcome::NeedsAttention { iterations, issue_history } => {
                assert_eq!(iterations, 2);
                assert_eq!(issue_history.len(), 2);
            }
            other => panic!("expected needs_attention, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn identical_fix_requests_stop_early_as_non_progressing() {
        let temp = tempfile::tempdir().unwrap();
        let qa_loop = QaLoop::new(
            vec![Box::new(BuildValidator::new())],
            QaLoopConfig { max_iterations: 5 },
        );
        let ctx = ValidatorContext::new("001-example", temp.path(), temp.path());

        let outcome = qa_loop
            .run(
                &ctx,
                |_evidence| async {
                    ReviewVerdict::Rejected {
                        issues: vec!["same issue every time".into()],
                        severity: "high".into(),
                    }
                },
                |_issues| async {},
            )
            .await;

        match outcome {
            QaLoopOutcome::NeedsAttention { iterations, .. } => assert_eq!(iterations, 2),
            other => panic!("expected early stop, got {:?}", other),
        }
    }
}
