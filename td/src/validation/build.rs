//! Build Validator
//!
//! Runs the project's own lint/build/test commands, in that order, and stops
//! at the first failure. Commands are never invented here: they come from a
//! project-index file produced ahead of time by a separate analyzer.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ProjectCapabilities, Validator, ValidatorContext, ValidatorResult};

/// The subset of the project-index file the Build Validator reads.
/// Unknown fields are ignored; a missing command is simply skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectIndex {
    #[serde(default)]
    pub lint_command: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub test_command: Option<String>,
}

impl ProjectIndex {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn commands(&self) -> Vec<(&'static str, &str)> {
        let mut commands = Vec::new();
        if let Some(cmd) = &self.lint_command {
            commands.push(("lint", cmd.as_str()));
        }
        if let Some(cmd) = &self.build_command {
            commands.push(("build", cmd.as_str()));
        }
        if let Some(cmd) = &self.test_command {
            commands.push(("test", cmd.as_str()));
        }
        commands
    }
}

/// Runs `lint`, `build`, `test` in sequence inside the worktree.
pub struct BuildValidator {
    index_file_name: String,
}

impl BuildValidator {
    pub const NAME: &'static str = "build";

    pub fn new() -> Self {
        Self {
            index_file_name: ".auto-claude/project_index.json".to_string(),
        }
    }

    /// Override where the project-index file is looked up, relative to the
    /// worktree root. Mainly useful in tests.
    pub fn with_index_file(mut self, relative_path: impl Into<String>) -> Self {
        self.index_file_name = relative_path.into();
        self
    }

    async fn run_one(&self, stage: &str, command: &str, cwd: &Path) -> Result<String, String> {
        debug!(stage, command, "BuildValidator::run_one: called");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| format!("failed to spawn `{}`: {}", command, e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            Err(combined)
        }
    }
}

impl Default for BuildValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for BuildValidator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn selectable(&self, _capabilities: &ProjectCapabilities) -> bool {
        // The build validator always runs; it is the one validator the QA
        // Loop never skips selecting, even for an empty capability set.
        true
    }

    async fn run(&self, context: &ValidatorContext) -> ValidatorResult {
        let index_path = context.worktree_path.join(&self.index_file_name);
        let index = match ProjectIndex::load(&index_path) {
            Ok(index) => index,
            Err(e) => {
                warn!(?index_path, error = %e, "BuildValidator::run: no project index, nothing to validate");
                return ValidatorResult::skipped(Self::NAME, format!("no project index at {}: {}", index_path.display(), e));
            }
        };

        let commands = index.commands();
        if commands.is_empty() {
            return ValidatorResult::skipped(Self::NAME, "project index names no commands");
        }

        for (stage, command) in commands {
            match self.run_one(stage, command, &context.worktree_path).await {
                Ok(_) => continue,
                Err(output) => {
                    return ValidatorResult::fail(Self::NAME, format!("{} failed: {}", stage, command))
                        .with_details(json!({ "stage": stage, "command": command, "output": output }));
                }
            }
        }

        ValidatorResult::pass(Self::NAME, "lint/build/test all passed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_index_skips_missing_commands() {
        let index = ProjectIndex {
            lint_command: None,
            build_command: Some("cargo build".into()),
            test_command: None,
        };
        assert_eq!(index.commands(), vec![("build", "cargo build")]);
    }

    #[tokio::test]
    async fn missing_index_is_skipped_not_failed() {
        let temp = tempfile::tempdir().unwrap();
        let validator = BuildValidator::new();
        let ctx = ValidatorContext::new("001-example", temp.path(), temp.path());
        let result = validator.run(&ctx).await;
        assert!(result.skipped);
        assert!(result.passed);
    }

    #[tokio::test]
    async fn first_failing_stage_short_circuits() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(".auto-claude")).unwrap();
        std::fs::write(
            temp.path().join(".auto-claude/project_index.json"),
            r#"{"lint_command": "exit 1", "build_command": "exit 0"}"#,
        )
        .unwrap();

        let validator = BuildValidator::new();
        let ctx = ValidatorContext::new("001-example", temp.path(), temp.path());
        let result = validator.run(&ctx).await;
        assert!(!result.passed);
        assert!(!result.skipped);
        assert_eq!(result.details["stage"], "lint");
    }
}
