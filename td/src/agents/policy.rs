//! Exec Policy — the first authorization layer evaluated before a bash
//! dispatch. Three more layers (project allowlist hook, session-layer
//! permissions, OS sandbox) are evaluated by the caller after this one
//! passes; a reject at any layer aborts the call with a structured error
//! that flows back through the Agent Session.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// What bash access a security level grants, before allow/deny overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// No commands permitted at all.
    Deny,
    /// Only commands from the built-in read-only set.
    Readonly,
    /// Commands matching the detected-stack allowlist, plus `extraAllow`
    /// minus `extraDeny`.
    Allowlist,
    /// Defers to the project security profile (still subject to the
    /// worktree's mutation policy).
    Full,
}

/// Commands always permitted at `Readonly` security, regardless of stack.
const READONLY_COMMANDS: &[&str] = &["cat", "ls", "grep", "jq", "head", "tail", "wc", "find", "pwd"];

/// `git` subcommands permitted at `Readonly` security.
const READONLY_GIT_SUBCOMMANDS: &[&str] = &["status", "log", "show", "diff", "branch", "worktree"];

#[derive(Debug, Error)]
pub enum ExecPolicyError {
    #[error("security level `deny` permits no commands, rejected `{command}`")]
    Denied { command: String },
    #[error("`{command}` is not in the read-only command set")]
    NotReadonly { command: String },
    #[error("`{command}` is not in the allowlist (stack: {stack:?}, extra_allow: {extra_allow:?})")]
    NotAllowlisted {
        command: String,
        stack: Vec<String>,
        extra_allow: Vec<String>,
    },
    #[error("`{command}` is explicitly denied")]
    ExplicitlyDenied { command: String },
    /// spec.md §4.4: "merge, push, rebase, checkout of the main branch are
    /// forbidden — any attempt is rejected at Exec Policy". Checked
    /// regardless of security level, including `Full`.
    #[error("`{command}` would mutate the main branch from inside a worktree ({reason}), forbidden at every security level")]
    ForbiddenMainBranchMutation { command: String, reason: String },
}

/// Evaluates whether a shell command may be dispatched for one agent.
#[derive(Debug, Clone)]
pub struct ExecPolicy {
    security_level: SecurityLevel,
    /// Commands detected from the project's own stack (npm, cargo, go, ...).
    stack_allowlist: Vec<String>,
    extra_allow: Vec<String>,
    extra_deny: Vec<String>,
    /// The project's main branch, for the worktree mutation check
    /// (spec.md §4.4). Defaults to `"main"` when unset.
    main_branch: Option<String>,
}

impl ExecPolicy {
    pub fn new(security_level: SecurityLevel, stack_allowlist: Vec<String>) -> Self {
        Self {
            security_level,
            stack_allowlist,
            extra_allow: Vec::new(),
            extra_deny: Vec::new(),
            main_branch: None,
        }
    }

    pub fn with_extra_allow(mut self, extra: Vec<String>) -> Self {
        self.extra_allow = extra;
        self
    }

    pub fn with_extra_deny(mut self, extra: Vec<String>) -> Self {
        self.extra_deny = extra;
        self
    }

    pub fn with_main_branch(mut self, main_branch: impl Into<String>) -> Self {
        self.main_branch = Some(main_branch.into());
        self
    }

    /// The executable name a shell command starts with, e.g. `"git"` for
    /// `"git status"`.
    fn program_of(command: &str) -> &str {
        command.trim().split_whitespace().next().unwrap_or("")
    }

    fn is_readonly_command(command: &str) -> bool {
        let program = Self::program_of(command);
        if READONLY_COMMANDS.contains(&program) {
            return true;
        }
        if program == "git" {
            let sub = command.trim().split_whitespace().nth(1).unwrap_or("");
            return READONLY_GIT_SUBCOMMANDS.contains(&sub);
        }
        false
    }

    /// The worktree mutation policy (spec.md §4.4): `git merge|push|rebase`
    /// are forbidden outright, `git checkout <mainBranch>` and `git reset
    /// --hard` are forbidden specifically. Returns the human-readable reason
    /// when `command` violates it, `None` otherwise.
    fn main_branch_violation(&self, command: &str) -> Option<String> {
        let mut parts = command.trim().split_whitespace();
        if parts.next() != Some("git") {
            return None;
        }
        let sub = parts.next().unwrap_or("");
        match sub {
            "merge" | "push" | "rebase" => Some(format!("git {sub} can only run in the merge stage, outside the worktree")),
            "checkout" => {
                let target = parts.next().unwrap_or("");
                let main_branch = self.main_branch.as_deref().unwrap_or("main");
                if target == main_branch {
                    Some(format!("checkout of the main branch `{main_branch}` is forbidden from inside a worktree"))
                } else {
                    None
                }
            }
            "reset" => {
                if parts.any(|arg| arg == "--hard") {
                    Some("`git reset --hard` is forbidden from inside a worktree".to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Evaluate one command against this agent's security level. This is
    /// layer 1 of 4; callers still owe the project allowlist hook, the
    /// session-layer permission check, and the OS sandbox. The worktree
    /// mutation check runs first and applies regardless of security level —
    /// `Full` still "defers to the project security profile (still subject
    /// to worktree mutation policy)" per spec.md §4.5.
    pub fn evaluate(&self, command: &str) -> Result<(), ExecPolicyError> {
        debug!(%command, security_level = ?self.security_level, "ExecPolicy::evaluate: called");

        if let Some(reason) = self.main_branch_violation(command) {
            return Err(ExecPolicyError::ForbiddenMainBranchMutation {
                command: command.to_string(),
                reason,
            });
        }

        let program = Self::program_of(command);

        if self.extra_deny.iter().any(|denied| denied == program) {
            return Err(ExecPolicyError::ExplicitlyDenied {
                command: command.to_string(),
            });
        }

        if self.extra_allow.iter().any(|allowed| allowed == program) {
            return Ok(());
        }

        match self.security_level {
            SecurityLevel::Deny => Err(ExecPolicyError::Denied {
                command: command.to_string(),
            }),
            SecurityLevel::Readonly => {
                if Self::is_readonly_command(command) {
                    Ok(())
                } else {
                    Err(ExecPolicyError::NotReadonly {
                        command: command.to_string(),
                    })
                }
            }
            SecurityLevel::Allowlist => {
                if Self::is_readonly_command(command) || self.stack_allowlist.iter().any(|allowed| allowed == program) {
                    Ok(())
                } else {
                    Err(ExecPolicyError::NotAllowlisted {
                        command: command.to_string(),
                        stack: self.stack_allowlist.clone(),
                        extra_allow: self.extra_allow.clone(),
                    })
                }
            }
            SecurityLevel::Full => Ok(()),
        }
    }
}
