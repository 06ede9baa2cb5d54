//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

/// taskdaemon - spec-directory task supervisor
#[derive(Parser)]
#[command(
    name = "taskdaemon",
    about = "Watches a project's specs directory and supervises task execution",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the taskdaemon daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Show daemon logs
    Logs {
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Internal: run the Pipeline Engine for a single task, then exit.
    /// Invoked by the supervisor as a child process; not meant to be run
    /// directly (spec.md §4.1 admission algorithm, "spawn a child process").
    #[command(hide = true, name = "run-task")]
    RunTask(RunTaskArgs),
}

/// Runtime flags shared by `daemon start` and the foreground run it forks
/// into (spec.md §6.5).
#[derive(Debug, Clone, clap::Args)]
pub struct DaemonRuntimeArgs {
    /// Project root (required)
    #[arg(long = "project-dir", value_name = "DIR")]
    pub project_dir: PathBuf,

    /// Worker pool size
    #[arg(long = "max-concurrent", default_value_t = 1)]
    pub max_concurrent: u32,

    /// Enable git worktree isolation per task
    #[arg(long = "use-worktrees", default_value_t = false)]
    pub use_worktrees: bool,

    /// Status file path (default: `{project-dir}/.auto-claude/daemon_status.json`)
    #[arg(long = "status-file", value_name = "PATH")]
    pub status_file: Option<PathBuf>,

    /// Seconds of silence before a running task is considered stuck
    #[arg(long = "stuck-timeout", default_value_t = 600)]
    pub stuck_timeout_secs: u64,

    /// Seconds between full specs-directory rescans
    #[arg(long = "rescan-interval", default_value_t = 60)]
    pub rescan_interval_secs: u64,

    /// Max recovery attempts per task before it is marked `error`
    #[arg(long = "max-recovery", default_value_t = 3)]
    pub max_recovery: u32,

    /// Max `design`/`architecture` decomposition depth
    #[arg(long = "max-child-depth", default_value_t = 2)]
    pub max_child_depth: u32,
}

/// Arguments for the hidden internal `run-task` entry point.
#[derive(Debug, Clone, clap::Args)]
pub struct RunTaskArgs {
    #[arg(long = "project-dir", value_name = "DIR")]
    pub project_dir: PathBuf,

    #[arg(long = "spec-id", value_name = "SPEC_ID")]
    pub spec_id: String,

    #[arg(long = "repo-root", value_name = "DIR")]
    pub repo_root: PathBuf,

    #[arg(long = "main-branch", default_value = "main")]
    pub main_branch: String,

    #[arg(long = "use-worktree", default_value_t = false)]
    pub use_worktree: bool,
}

/// Daemon management subcommands
#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon
    Start {
        /// Don't fork to background (run in foreground)
        #[arg(long)]
        foreground: bool,

        #[command(flatten)]
        runtime: DaemonRuntimeArgs,
    },

    /// Stop the daemon
    Stop,

    /// Check daemon status
    Status {
        /// Show detailed per-task information
        #[arg(short, long)]
        detailed: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Ping the daemon to check if it's alive and responsive
    Ping,
}

/// Result of checking a required tool
pub struct ToolCheck {
    pub name: &'static str,
    pub available: bool,
    pub version: Option<String>,
}

impl ToolCheck {
    /// Check if a tool is available and get its version
    pub fn check(name: &'static str, version_args: &[&str]) -> Self {
        debug!(name, ?version_args, "ToolCheck::check: called");
        let result = std::process::Command::new(name).args(version_args).output();

        match result {
            Ok(output) if output.status.success() => {
                debug!(name, "ToolCheck::check: tool available");
                let version_str = String::from_utf8_lossy(&output.stdout);
                let version = parse_version(&version_str);
                Self {
                    name,
                    available: true,
                    version: Some(version),
                }
            }
            _ => {
                debug!(name, "ToolCheck::check: tool not available");
                Self {
                    name,
                    available: false,
                    version: None,
                }
            }
        }
    }
}

/// Parse version from command output (extracts first version-like string)
fn parse_version(output: &str) -> String {
    debug!(%output, "parse_version: called");
    // Look for patterns like "1.2.3" or "v1.2.3"
    for word in output.split_whitespace() {
        let word = word.trim_start_matches('v');
        if word.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            // Take until non-version character
            let version: String = word.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if !version.is_empty() {
                debug!(%version, "parse_version: found version");
                return version;
            }
        }
    }
    debug!("parse_version: no version found, returning unknown");
    "unknown".to_string()
}

/// Check all required tools and return their status
pub fn check_required_tools() -> Vec<ToolCheck> {
    debug!("check_required_tools: called");
    let tools = vec![ToolCheck::check("git", &["--version"])];
    debug!(count = tools.len(), "check_required_tools: returning tools");
    tools
}

/// Check if the daemon is running (lightweight check for help display)
pub fn is_daemon_running() -> bool {
    debug!("is_daemon_running: called");
    let pid_file = dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("taskdaemon")
        .join("taskdaemon.pid");

    if !pid_file.exists() {
        debug!(?pid_file, "is_daemon_running: pid file does not exist");
        return false;
    }

    if let Ok(contents) = std::fs::read_to_string(&pid_file)
        && let Ok(pid) = contents.trim().parse::<u32>()
    {
        let exists = PathBuf::from(format!("/proc/{}", pid)).exists();
        debug!(pid, exists, "is_daemon_running: checked process existence");
        return exists;
    }

    debug!("is_daemon_running: could not read or parse pid file");
    false
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskdaemon")
        .join("logs")
        .join("taskdaemon.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with tool checks and daemon status
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let tools = check_required_tools();
    let daemon_running = is_daemon_running();
    let log_path = get_log_path();

    let mut help = String::new();

    help.push_str("Required Tools:\n");
    for tool in &tools {
        let icon = if tool.available {
            debug!(name = tool.name, "generate_after_help: tool available");
            "\u{2705}"
        } else {
            debug!(name = tool.name, "generate_after_help: tool not available");
            "\u{274C}"
        };
        let version = tool.version.as_deref().unwrap_or("not found");
        help.push_str(&format!("  {} {:<10} {}\n", icon, tool.name, version));
    }

    help.push('\n');
    help.push_str("Daemon:\n");
    let daemon_icon = if daemon_running {
        debug!("generate_after_help: daemon is running");
        "\u{2705}"
    } else {
        debug!("generate_after_help: daemon is stopped");
        "\u{274C}"
    };
    let daemon_status = if daemon_running { "running" } else { "stopped" };
    help.push_str(&format!("  {} {}\n", daemon_icon, daemon_status));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", log_path.display()));

    debug!("generate_after_help: returning help text");
    help
}

/// Output format for status/metrics commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => {
                debug!("OutputFormat::from_str: matched Text");
                Ok(Self::Text)
            }
            "json" => {
                debug!("OutputFormat::from_str: matched Json");
                Ok(Self::Json)
            }
            "table" => {
                debug!("OutputFormat::from_str: matched Table");
                Ok(Self::Table)
            }
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text, json, or table", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        debug!(?self, "OutputFormat::fmt: called");
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["taskdaemon"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_daemon_start() {
        let cli = Cli::parse_from(["taskdaemon", "daemon", "start", "--project-dir", "/proj"]);
        match cli.command {
            Some(Command::Daemon {
                command: DaemonCommand::Start { foreground, runtime },
            }) => {
                assert!(!foreground);
                assert_eq!(runtime.project_dir, PathBuf::from("/proj"));
                assert_eq!(runtime.max_concurrent, 1);
                assert!(!runtime.use_worktrees);
                assert_eq!(runtime.stuck_timeout_secs, 600);
                assert_eq!(runtime.rescan_interval_secs, 60);
                assert_eq!(runtime.max_recovery, 3);
                assert_eq!(runtime.max_child_depth, 2);
            }
            other => panic!("expected Daemon Start, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_daemon_start_foreground_with_overrides() {
        let cli = Cli::parse_from([
            "taskdaemon",
            "daemon",
            "start",
            "--foreground",
            "--project-dir",
            "/proj",
            "--max-concurrent",
            "4",
            "--use-worktrees",
            "--max-child-depth",
            "1",
        ]);
        match cli.command {
            Some(Command::Daemon {
                command: DaemonCommand::Start { foreground, runtime },
            }) => {
                assert!(foreground);
                assert_eq!(runtime.max_concurrent, 4);
                assert!(runtime.use_worktrees);
                assert_eq!(runtime.max_child_depth, 1);
            }
            other => panic!("expected Daemon Start, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_daemon_stop() {
        let cli = Cli::parse_from(["taskdaemon", "daemon", "stop"]);
        assert!(matches!(
            cli.command,
            Some(Command::Daemon {
                command: DaemonCommand::Stop
            })
        ));
    }

    #[test]
    fn test_cli_parse_daemon_status() {
        let cli = Cli::parse_from(["taskdaemon", "daemon", "status"]);
        assert!(matches!(
            cli.command,
            Some(Command::Daemon {
                command: DaemonCommand::Status { .. }
            })
        ));
    }

    #[test]
    fn test_cli_parse_run_task() {
        let cli = Cli::parse_from([
            "taskdaemon",
            "run-task",
            "--project-dir",
            "/proj",
            "--spec-id",
            "001-a",
            "--repo-root",
            "/proj",
        ]);
        match cli.command {
            Some(Command::RunTask(args)) => {
                assert_eq!(args.spec_id, "001-a");
                assert_eq!(args.main_branch, "main");
                assert!(!args.use_worktree);
            }
            other => panic!("expected RunTask, got {other:?}"),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!(matches!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table)));
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["taskdaemon", "-c", "/path/to/config.yml", "daemon", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("git version 2.43.0"), "2.43.0");
        assert_eq!(parse_version("bwrap 0.9.0"), "0.9.0");
        assert_eq!(parse_version("v1.2.3"), "1.2.3");
    }
}
