//! AgentDefinition and the tool-profile bundles it references

use serde::{Deserialize, Serialize};

use super::policy::{ExecPolicy, SecurityLevel};

/// Bundles of frequently-combined tools, so a definition doesn't have to
/// spell out its full tool list by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolProfile {
    /// Read a file, list a directory — nothing else.
    Minimal,
    /// Minimal plus search/grep/glob, no mutation.
    Readonly,
    /// Full read/write/edit/bash, for implementation work.
    Coding,
    /// Read/write plus the validators' own tools, for QA fix/review passes.
    Qa,
    /// Everything, including coordination tools (query/share).
    Full,
}

impl ToolProfile {
    /// Tool names this profile grants, before `extraTools`/`extraAllow` are applied.
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            Self::Minimal => &["read", "list"],
            Self::Readonly => &["read", "list", "glob", "grep", "tree", "search"],
            Self::Coding => &["read", "write", "edit", "list", "glob", "grep", "tree", "bash", "todo"],
            Self::Qa => &["read", "write", "edit", "list", "glob", "grep", "tree", "bash"],
            Self::Full => &[
                "read",
                "write",
                "edit",
                "list",
                "glob",
                "grep",
                "tree",
                "bash",
                "todo",
                "fetch",
                "search",
                "complete_task",
                "query",
                "share",
            ],
        }
    }
}

/// How an agent session runs once dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// A single request/response turn; no tool-use loop (e.g. the QA
    /// Reviewer, which only reads evidence and renders a verdict).
    SingleTurn,
    /// An iterative tool-use loop until the agent calls `complete_task` or
    /// is cancelled (e.g. the build/fix agents).
    Agentic,
}

/// Everything the daemon needs to know to run one kind of agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub agent_kind: String,
    pub tools: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub extra_tools: Vec<String>,
    #[serde(default)]
    pub thinking_default: bool,
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub extra_allow: Vec<String>,
    #[serde(default)]
    pub extra_deny: Vec<String>,
    pub system_prompt: String,
    #[serde(default)]
    pub prompt_template: Option<String>,
    pub execution_mode: ExecutionMode,
    pub tool_profile: ToolProfile,
}

impl AgentDefinition {
    pub fn new(agent_kind: impl Into<String>, security_level: SecurityLevel, tool_profile: ToolProfile) -> Self {
        Self {
            agent_kind: agent_kind.into(),
            tools: tool_profile.tool_names().iter().map(|s| s.to_string()).collect(),
            mcp_servers: Vec::new(),
            extra_tools: Vec::new(),
            thinking_default: false,
            security_level,
            extra_allow: Vec::new(),
            extra_deny: Vec::new(),
            system_prompt: String::new(),
            prompt_template: None,
            execution_mode: ExecutionMode::Agentic,
            tool_profile,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_extra_allow(mut self, extra: Vec<String>) -> Self {
        self.extra_allow = extra;
        self
    }

    pub fn with_extra_deny(mut self, extra: Vec<String>) -> Self {
        self.extra_deny = extra;
        self
    }

    /// Builds the Exec Policy layer 1 of §4.5's 4-layer authorization chain
    /// for this agent: its own security level and allow/deny overrides,
    /// plus the project's detected stack allowlist and main branch so the
    /// worktree mutation check (§4.4) can recognize `checkout <mainBranch>`.
    pub fn exec_policy(&self, stack_allowlist: Vec<String>, main_branch: impl Into<String>) -> ExecPolicy {
        ExecPolicy::new(self.security_level, stack_allowlist)
            .with_extra_allow(self.extra_allow.clone())
            .with_extra_deny(self.extra_deny.clone())
            .with_main_branch(main_branch)
    }

    /// All tool names this definition grants: profile tools plus `extraTools`.
    pub fn all_tools(&self) -> Vec<String> {
        let mut tools = self.tools.clone();
        for tool in &self.extra_tools {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }
        tools
    }
}
