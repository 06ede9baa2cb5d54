//! TaskDaemon configuration types and loading
//!
//! Settings & Policy Resolution (spec.md §4.14): model/thinking/permissions
//! are never read directly off a single struct. `LlmConfig::resolve` and
//! `resolve_agent_policy` apply the same layered-override shape the rest of
//! this module already uses for finding the config file itself — explicit
//! override, then project config, then built-in default — so a custom agent
//! or a `.taskdaemon.yml` can tighten or loosen what the registry's
//! `AgentDefinition` says without the daemon caring which layer won.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::agents::{AgentDefinition, SecurityLevel};

/// Main TaskDaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Concurrency limits
    pub concurrency: ConcurrencyConfig,

    /// Validation defaults
    pub validation: ValidationConfig,

    /// Git configuration
    pub git: GitConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .taskdaemon.yml
        let local_config = PathBuf::from(".taskdaemon.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/taskdaemon/taskdaemon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskdaemon").join("taskdaemon.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// Errors raised while resolving a layered setting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingApiKey(String),
}

/// A fully-resolved LLM configuration for one client construction: no more
/// fallbacks left to apply. The API key itself is resolved lazily via
/// [`ResolvedLlmConfig::get_api_key`] rather than read eagerly, so
/// constructing one never fails just because a key is briefly unset.
#[derive(Debug, Clone)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    api_key_env: String,
}

impl ResolvedLlmConfig {
    /// Read the API key from the environment variable named by this config.
    pub fn get_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env).map_err(|_| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

impl LlmConfig {
    /// Resolve against the process environment. An env var named
    /// `TASKDAEMON_MODEL` overrides `model` when set — the "explicit
    /// override beats config file" layer `Config::load` already applies one
    /// level up, extended here to a single field so a one-off run can swap
    /// models without editing `.taskdaemon.yml`.
    pub fn resolve(&self) -> Result<ResolvedLlmConfig, ConfigError> {
        let model = std::env::var("TASKDAEMON_MODEL").unwrap_or_else(|_| self.model.clone());
        Ok(ResolvedLlmConfig {
            provider: self.provider.clone(),
            model,
            base_url: self.base_url.clone(),
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
            api_key_env: self.api_key_env.clone(),
        })
    }
}

/// Per-agent-kind overrides a project may set in `.taskdaemon.yml`, layered
/// on top of the [`AgentDefinition`] the [`AgentRegistry`](crate::agents::AgentRegistry)
/// supplies. Any field left `None` falls through to the registry default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPolicyOverrides {
    pub thinking: Option<bool>,
    pub security_level: Option<SecurityLevel>,
}

/// The model/thinking/permissions settings resolved for one agent turn.
#[derive(Debug, Clone)]
pub struct ResolvedAgentPolicy {
    pub agent_kind: String,
    pub thinking_enabled: bool,
    pub security_level: SecurityLevel,
}

/// Resolve one agent kind's effective policy: registry default, then the
/// project's `agent_overrides` map for that kind, explicit override wins.
pub fn resolve_agent_policy(
    definition: &AgentDefinition,
    overrides: &HashMap<String, AgentPolicyOverrides>,
) -> ResolvedAgentPolicy {
    let agent_override = overrides.get(&definition.agent_kind);
    ResolvedAgentPolicy {
        agent_kind: definition.agent_kind.clone(),
        thinking_enabled: agent_override
            .and_then(|o| o.thinking)
            .unwrap_or(definition.thinking_default),
        security_level: agent_override
            .and_then(|o| o.security_level)
            .unwrap_or(definition.security_level),
    }
}

/// Concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum concurrent loops
    #[serde(rename = "max-loops")]
    pub max_loops: u32,

    /// Maximum concurrent API calls
    #[serde(rename = "max-api-calls")]
    pub max_api_calls: u32,

    /// Maximum worktrees
    #[serde(rename = "max-worktrees")]
    pub max_worktrees: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_loops: 50,
            max_api_calls: 10,
            max_worktrees: 50,
        }
    }
}

/// Validation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Default validation command
    pub command: String,

    /// Iteration timeout in milliseconds
    #[serde(rename = "iteration-timeout-ms")]
    pub iteration_timeout_ms: u64,

    /// Maximum iterations before giving up
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            command: "otto ci".to_string(),
            iteration_timeout_ms: 300_000,
            max_iterations: 100,
        }
    }
}

/// Git configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Directory for git worktrees
    #[serde(rename = "worktree-dir")]
    pub worktree_dir: PathBuf,

    /// Disk quota for worktrees in GB
    #[serde(rename = "disk-quota-gb")]
    pub disk_quota_gb: u32,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            worktree_dir: PathBuf::from("/tmp/taskdaemon/worktrees"),
            disk_quota_gb: 100,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for TaskStore data
    #[serde(rename = "taskstore-dir")]
    pub taskstore_dir: String,

    /// Warning threshold for JSONL file size in MB
    #[serde(rename = "jsonl-warn-mb")]
    pub jsonl_warn_mb: u32,

    /// Error threshold for JSONL file size in MB
    #[serde(rename = "jsonl-error-mb")]
    pub jsonl_error_mb: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            taskstore_dir: ".taskstore".to_string(),
            jsonl_warn_mb: 100,
            jsonl_error_mb: 500,
        }
    }
}

/// The Task Daemon's own runtime configuration (spec.md §6.5): the CLI
/// surface for one `td daemon start` invocation, distinct from the
/// project-wide `.taskdaemon.yml` settings above. Never loaded from a file —
/// built directly from CLI flags, with `MAX_CHILD_DEPTH` as the one
/// environment override (spec.md §6.6).
#[derive(Debug, Clone)]
pub struct DaemonRuntimeConfig {
    /// Project root; the specs directory watched for eligible tasks lives
    /// under it.
    pub project_dir: PathBuf,
    /// Worker pool size: how many tasks may run at once.
    pub max_concurrent: u32,
    /// Whether running tasks get an isolated git worktree or run in place.
    pub use_worktrees: bool,
    /// `{projectDir}/.auto-claude/daemon_status.json` unless overridden.
    pub status_file: PathBuf,
    /// How long a running task may go without a heartbeat before the
    /// daemon considers it stuck.
    pub stuck_timeout_secs: u64,
    /// Periodic specs-directory rescan interval, the fallback path when a
    /// filesystem notification is missed.
    pub rescan_interval_secs: u64,
    /// How many times a task may be recovered from a stuck/crashed state
    /// before it's left in `error`.
    pub max_recovery: u32,
    /// Deepest a `design`/`architecture` child chain may go.
    pub max_child_depth: u32,
}

impl DaemonRuntimeConfig {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let status_file = project_dir.join(".auto-claude").join("daemon_status.json");
        Self {
            project_dir,
            max_concurrent: 1,
            use_worktrees: false,
            status_file,
            stuck_timeout_secs: 600,
            rescan_interval_secs: 60,
            max_recovery: 3,
            max_child_depth: Self::max_child_depth_from_env().unwrap_or(2),
        }
    }

    /// `MAX_CHILD_DEPTH` overrides whatever `--max-child-depth` set, so an
    /// operator can tighten the cap fleet-wide without touching invocations.
    fn max_child_depth_from_env() -> Option<u32> {
        std::env::var("MAX_CHILD_DEPTH").ok()?.parse().ok()
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.project_dir.join("specs")
    }

    pub fn taskstore_dir(&self) -> PathBuf {
        self.project_dir.join(".taskstore")
    }
}

impl From<crate::cli::DaemonRuntimeArgs> for DaemonRuntimeConfig {
    fn from(args: crate::cli::DaemonRuntimeArgs) -> Self {
        let mut config = Self::new(args.project_dir);
        config.max_concurrent = args.max_concurrent;
        config.use_worktrees = args.use_worktrees;
        if let Some(status_file) = args.status_file {
            config.status_file = status_file;
        }
        config.stuck_timeout_secs = args.stuck_timeout_secs;
        config.rescan_interval_secs = args.rescan_interval_secs;
        config.max_recovery = args.max_recovery;
        config.max_child_depth = Self::max_child_depth_from_env().unwrap_or(args.max_child_depth);
        config
    }
}
