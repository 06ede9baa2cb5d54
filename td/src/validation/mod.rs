//! Validator Set
//!
//! Each validator answers two questions about one task's worktree:
//! whether it applies (`selectable`) and what it found (`run`). Validators
//! never decide pass/fail for the task as a whole or talk to each other —
//! that orchestration (build-first, then the rest in parallel, then QA
//! review) lives in [`QaLoop`].

mod api;
mod browser;
mod build;
mod db;
mod qa_loop;
pub mod rule_of_five;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use api::ApiValidator;
pub use browser::BrowserValidator;
pub use build::BuildValidator;
pub use db::DbValidator;
pub use qa_loop::{QaLoop, QaLoopConfig, QaLoopOutcome, ReviewVerdict};
pub use rule_of_five::{PassResult, PlanRefinementContext, ReviewPass};

/// Detected project capability flags. The daemon determines these once per
/// project (out of scope here) and passes them down so each validator can
/// decide for itself whether it has anything to check.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProjectCapabilities {
    pub web_frontend: bool,
    pub flutter: bool,
    pub electron: bool,
    pub tauri: bool,
    pub has_database: bool,
    pub has_api: bool,
}

/// Everything a validator needs to examine one task's worktree.
#[derive(Debug, Clone)]
pub struct ValidatorContext {
    pub spec_id: String,
    pub worktree_path: PathBuf,
    pub spec_dir: PathBuf,
    pub capabilities: ProjectCapabilities,
}

impl ValidatorContext {
    pub fn new(spec_id: impl Into<String>, worktree_path: impl Into<PathBuf>, spec_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec_id: spec_id.into(),
            worktree_path: worktree_path.into(),
            spec_dir: spec_dir.into(),
            capabilities: ProjectCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ProjectCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Evidence produced by a single validator run.
///
/// A `skipped` result never blocks the QA Loop: it is handed to the
/// reviewer as "this check could not run", not as a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub validator: String,
    pub passed: bool,
    pub skipped: bool,
    pub summary: String,
    #[serde(default)]
    pub details: Value,
}

impl ValidatorResult {
    pub fn pass(validator: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            passed: true,
            skipped: false,
            summary: summary.into(),
            details: Value::Null,
        }
    }

    pub fn fail(validator: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            passed: false,
            skipped: false,
            summary: summary.into(),
            details: Value::Null,
        }
    }

    /// A validator that could not run at all (e.g. failed to install a
    /// headless browser). Never treated as a failure by the QA Loop.
    pub fn skipped(validator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            passed: true,
            skipped: true,
            summary: reason.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Shared capability every validator implements.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Stable identifier, used in evidence and `QA_FIX_REQUEST` output.
    fn name(&self) -> &'static str;

    /// Whether this validator has anything to check for a project with the
    /// given capability flags.
    fn selectable(&self, capabilities: &ProjectCapabilities) -> bool;

    /// Run the check and return evidence. Must never panic: a validator
    /// that cannot complete its check returns `ValidatorResult::skipped`,
    /// not an `Err` — the QA Loop has no error path for validators.
    async fn run(&self, context: &ValidatorContext) -> ValidatorResult;
}
