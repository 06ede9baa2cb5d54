//! Task Daemon - spec-directory task supervisor
//!
//! CLI entry point: launches the supervisor daemon, or (as a hidden
//! internal command) runs the Pipeline Engine for a single task.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use taskdaemon::cli::{Cli, Command, DaemonCommand, OutputFormat, RunTaskArgs, generate_after_help, get_log_path};
use taskdaemon::config::{Config, DaemonRuntimeConfig};
use taskdaemon::daemon::{DaemonManager, DiscoveryEvent, SpecDiscovery, Supervisor, SupervisorConfig, SupervisorHandles};
use taskdaemon::domain::{SignoffStatus, Task, TaskKind, TaskPriority, TaskStatus};
use taskdaemon::events::{EventKind, SpecEventLog};
use taskdaemon::llm::create_client;
use taskdaemon::pipeline::{
    BuildAction, BuiltinPipeline, MergeAction, PipelineContext, PipelineEngine, PipelineError, QaAction,
    built_in_pipeline,
};
use taskdaemon::state::StateManager;
use taskdaemon::validation::{ApiValidator, BuildValidator, DbValidator, ProjectCapabilities, QaLoop, QaLoopConfig, Validator};
use taskdaemon::worktree::{WorktreeConfig, WorktreeManager};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskdaemon")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level_str = cli_log_level.or(config_log_level);
    let level = if let Some(s) = level_str {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        }
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::File::create(log_dir.join("taskdaemon.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("TaskDaemon loaded config: default={}", config.llm.default);

    debug!(command = ?cli.command, "main: dispatching command");
    let result = match cli.command {
        Some(Command::Daemon { command }) => match command {
            DaemonCommand::Start { foreground, runtime } => cmd_start(&config, foreground, runtime.into()).await,
            DaemonCommand::Stop => cmd_stop().await,
            DaemonCommand::Status { detailed, format } => cmd_status(detailed, format).await,
            DaemonCommand::Ping => cmd_ping().await,
        },
        Some(Command::Logs { follow, lines }) => cmd_logs(follow, lines).await,
        Some(Command::RunTask(args)) => cmd_run_task(&config, args).await,
        None => cmd_status(false, OutputFormat::Text).await,
    };

    match &result {
        Err(e) if e.downcast_ref::<AlreadyRunning>().is_some() => std::process::exit(2),
        Err(e) if e.downcast_ref::<NotInitialized>().is_some() => std::process::exit(3),
        Err(_) => std::process::exit(1),
        Ok(()) => {}
    }
    result
}

#[derive(Debug, thiserror::Error)]
#[error("daemon already running")]
struct AlreadyRunning;

#[derive(Debug, thiserror::Error)]
#[error("project not initialized: {0}")]
struct NotInitialized(String);

/// Start the daemon
async fn cmd_start(_config: &Config, foreground: bool, runtime: DaemonRuntimeConfig) -> Result<()> {
    debug!(foreground, "cmd_start: called");
    let daemon = DaemonManager::new();

    if daemon.is_running() {
        if let Some(pid) = daemon.running_pid() {
            println!("TaskDaemon is already running (PID: {})", pid);
        } else {
            println!("TaskDaemon is already running");
        }
        return Err(AlreadyRunning.into());
    }

    if !runtime.project_dir.join(".git").exists() {
        return Err(NotInitialized(format!(
            "{} is not a git repository",
            runtime.project_dir.display()
        ))
        .into());
    }

    if foreground {
        println!("Starting TaskDaemon in foreground mode...");
        run_supervisor(runtime).await
    } else {
        let pid = daemon.start()?;
        println!("TaskDaemon started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon via SIGTERM and wait briefly for it to exit.
async fn cmd_stop() -> Result<()> {
    let daemon = DaemonManager::new();

    if !daemon.is_running() {
        println!("TaskDaemon is not running");
        return Ok(());
    }

    let pid = daemon.running_pid();
    daemon.stop()?;
    if let Some(pid) = pid {
        println!("TaskDaemon stopped (was PID: {})", pid);
    } else {
        println!("TaskDaemon stopped");
    }
    Ok(())
}

/// Check whether the daemon process is alive via its PID file.
async fn cmd_ping() -> Result<()> {
    let daemon = DaemonManager::new();
    if !daemon.is_running() {
        println!("TaskDaemon is not running");
        return Ok(());
    }

    println!("Daemon is alive");
    if let Some(pid) = daemon.running_pid() {
        println!("PID: {}", pid);
    }

    Ok(())
}

/// Show daemon status, reading the Status Bridge's published snapshot when
/// available (spec.md §3.2).
async fn cmd_status(detailed: bool, format: OutputFormat) -> Result<()> {
    let daemon = DaemonManager::new();
    let status = daemon.status();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "pid_file": status.pid_file.to_string_lossy()
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!("TaskDaemon Status");
            println!("-----------------");
            if status.running {
                println!("Status: running");
                if let Some(pid) = status.pid {
                    println!("PID: {}", pid);
                }
            } else {
                println!("Status: stopped");
            }
            println!("PID file: {}", status.pid_file.display());

            if detailed && status.running {
                println!();
                println!("Read the Status Bridge's daemon_status.json (or connect to its");
                println!("WebSocket, port in [18800, 18809]) from the project directory for");
                println!("per-task detail.");
            }
        }
    }

    Ok(())
}

/// Show logs
async fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following log file: {} (Ctrl+C to stop)", log_path.display());
        println!();

        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        let file = fs::File::open(&log_path).context("Failed to open log file")?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = if all_lines.len() > lines { all_lines.len() - lines } else { 0 };

        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// The supervisor's main loop (spec.md §4.1): load the specs-directory
/// index into TaskStore, watch for changes, and drive [`Supervisor::tick`]
/// on every discovery event and on an idle timer.
async fn run_supervisor(runtime: DaemonRuntimeConfig) -> Result<()> {
    info!(project_dir = %runtime.project_dir.display(), "supervisor starting");

    let repo_root = runtime.project_dir.clone();
    let main_branch = current_branch(&repo_root).await.unwrap_or_else(|_| "main".to_string());

    fs::create_dir_all(runtime.taskstore_dir())?;
    let state = StateManager::spawn(runtime.taskstore_dir())?;

    let (mut discovery, mut discovery_rx) = SpecDiscovery::watch(runtime.specs_dir(), Duration::from_secs(runtime.rescan_interval_secs))?;
    sync_index_into_store(&state, discovery.index()).await?;

    let status_bridge = Arc::new(taskdaemon::status::StatusBridge::new(&runtime.project_dir));
    let _ws_handle = status_bridge.serve().await.ok();

    let worktrees = WorktreeManager::new(WorktreeConfig::with_repo(&repo_root));

    let supervisor_config = SupervisorConfig {
        project_dir: runtime.project_dir.clone(),
        repo_root: repo_root.clone(),
        main_branch,
        max_concurrent: runtime.max_concurrent,
        use_worktrees: runtime.use_worktrees,
        stuck_timeout: Duration::from_secs(runtime.stuck_timeout_secs),
        max_recovery: runtime.max_recovery,
        max_child_depth: runtime.max_child_depth,
        max_verify_attempts: 3,
    };

    let handles = SupervisorHandles {
        state,
        status: status_bridge,
        worktrees,
    };

    let mut supervisor = Supervisor::new(supervisor_config, handles);
    info!("supervisor initialized, entering admission loop");

    let mut idle_tick = tokio::time::interval(Duration::from_secs(5));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                maybe_event = discovery_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            handle_discovery_event(&mut discovery, &event, &supervisor).await;
                            supervisor.tick().await?;
                        }
                        None => break,
                    }
                }
                _ = idle_tick.tick() => {
                    supervisor.tick().await?;
                }
                _ = sigint.recv() => {
                    warn!("SIGINT received, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received, shutting down");
                    break;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        loop {
            tokio::select! {
                maybe_event = discovery_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            handle_discovery_event(&mut discovery, &event, &supervisor).await;
                            supervisor.tick().await?;
                        }
                        None => break,
                    }
                }
                _ = idle_tick.tick() => {
                    supervisor.tick().await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Ctrl+C received, shutting down");
                    break;
                }
            }
        }
    }

    info!("supervisor draining running tasks before exit");
    supervisor.drain(Duration::from_secs(30)).await;
    info!("supervisor shut down cleanly");
    Ok(())
}

async fn handle_discovery_event(discovery: &mut SpecDiscovery, event: &DiscoveryEvent, supervisor: &Supervisor) {
    let changed = discovery.apply(event);
    debug!(?changed, "discovery event applied");
    for spec_id in changed {
        if let Some(plan) = discovery.index().get(&spec_id) {
            if let Err(e) = upsert_task_from_plan(supervisor.state(), &spec_id, plan).await {
                warn!(%spec_id, error = %e, "failed to sync discovered plan into TaskStore");
            }
        }
    }
}

async fn sync_index_into_store(state: &StateManager, index: &taskdaemon::daemon::SpecsIndex) -> Result<()> {
    for plan in index.plans() {
        upsert_task_from_plan(state, &plan.spec_id, plan).await?;
    }
    Ok(())
}

/// The specs directory is the source of truth for `kind`/`priority`/
/// `dependsOn`/`parentTask`; a task record is created on first sight and
/// left alone (status/recoveryCount are owned by the supervisor) on repeat
/// syncs, except status which tracks the plan when the plan is ahead.
async fn upsert_task_from_plan(state: &StateManager, spec_id: &str, plan: &taskdaemon::domain::Plan) -> Result<()> {
    match state.get_task(spec_id).await? {
        Some(mut task) => {
            if task.status != plan.status {
                task.status = plan.status;
                task.execution_phase = plan.execution_phase;
                state.update_task(task).await?;
            }
        }
        None => {
            let mut task = Task::new(spec_id.to_string(), plan.kind, plan.priority);
            task.depends_on = plan.depends_on.clone();
            task.parent_task = plan.parent_task.clone();
            task.status = plan.status;
            task.execution_phase = plan.execution_phase;
            state.create_task(task).await?;
        }
    }
    Ok(())
}

async fn current_branch(repo_root: &std::path::Path) -> Result<String> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(repo_root)
        .output()
        .await?;
    if !output.status.success() {
        return Err(eyre::eyre!("git rev-parse failed"));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Internal: run the Pipeline Engine for one task and exit. Spawned by the
/// supervisor as a child process (spec.md §4.1 admission algorithm).
/// Prints a stdout line per pipeline stage completion, which the
/// supervisor's parent process treats as a heartbeat.
async fn cmd_run_task(config: &Config, args: RunTaskArgs) -> Result<()> {
    info!(spec_id = %args.spec_id, "run-task: starting");

    let state = StateManager::spawn(args.project_dir.join(".taskstore"))?;
    let mut task = state
        .get_task_required(&args.spec_id)
        .await
        .context("task not found in TaskStore")?;
    let mut plan = state.get_plan(&args.spec_id).await?.unwrap_or_else(|| {
        taskdaemon::domain::Plan::new(args.spec_id.clone(), task.kind, task.priority)
    });

    let spec_dir = args.project_dir.join("specs").join(&args.spec_id);
    let working_dir = if args.use_worktree {
        args.repo_root.join(".auto-claude").join("worktrees").join("tasks").join(&args.spec_id)
    } else {
        args.repo_root.clone()
    };

    let mut log = SpecEventLog::open(&spec_dir)?;
    log.append(EventKind::TaskEvent, serde_json::json!({"stage": "run-task-start"}))?;

    let llm = create_client(&config.llm).context("failed to create LLM client")?;
    let validators: Vec<Box<dyn Validator>> = vec![
        Box::new(BuildValidator::new()),
        Box::new(ApiValidator::new()),
        Box::new(DbValidator::new()),
    ];
    let qa_loop = Arc::new(QaLoop::new(validators, QaLoopConfig::default()));

    let mut actions: std::collections::HashMap<&'static str, Arc<dyn taskdaemon::pipeline::StageAction>> =
        std::collections::HashMap::new();
    actions.insert("build", Arc::new(BuildAction { llm, max_tokens: 4096 }));
    actions.insert(
        "qa",
        Arc::new(QaAction {
            qa_loop,
            capabilities: ProjectCapabilities::default(),
        }),
    );
    actions.insert(
        "merge",
        Arc::new(MergeAction {
            repo_root: args.repo_root.clone(),
            main_branch: args.main_branch.clone(),
        }),
    );

    let (pipeline_kind, skip_qa) = match task.kind {
        TaskKind::Verify | TaskKind::ErrorCheck | TaskKind::Review => (BuiltinPipeline::QaOnly, false),
        _ => (BuiltinPipeline::Default, false),
    };
    let stages = built_in_pipeline(pipeline_kind, actions, skip_qa)?;

    let ctx = PipelineContext::new(args.spec_id.clone(), working_dir, spec_dir.clone());
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(20));
        loop {
            ticker.tick().await;
            println!("heartbeat");
        }
    });

    let outcome = PipelineEngine::new().run(stages, &ctx).await;
    heartbeat.abort();

    match outcome {
        Ok(results) => {
            for result in &results {
                println!("stage {} -> {:?}", result.name, result.outcome);
            }
            plan.qa_signoff.status = SignoffStatus::Approved;
            plan.set_status(TaskStatus::HumanReview);
            plan.set_phase(taskdaemon::domain::ExecutionPhase::BuildComplete);
            task.transition(TaskStatus::HumanReview);
            task.set_phase(taskdaemon::domain::ExecutionPhase::BuildComplete);
            log.append(EventKind::QaPassed, serde_json::json!({"stages": results.len()}))?;
            info!(spec_id = %args.spec_id, "run-task: pipeline completed successfully");
        }
        Err(PipelineError::StageFailed { name, message }) => {
            plan.push_error(name.clone(), &message);
            plan.qa_signoff.status = SignoffStatus::Rejected;
            task.transition(TaskStatus::QaFixing);
            log.append(EventKind::QaFailed, serde_json::json!({"stage": name, "message": message}))?;
            warn!(spec_id = %args.spec_id, %name, %message, "run-task: stage failed");
        }
        Err(e) => {
            plan.push_error("pipeline", &e.to_string());
            task.transition(TaskStatus::Error);
            log.append(EventKind::TaskEvent, serde_json::json!({"error": e.to_string()}))?;
            warn!(spec_id = %args.spec_id, error = %e, "run-task: pipeline error");
        }
    }

    state.update_task(task).await?;
    state.update_plan(plan).await?;
    log.append(EventKind::TaskEvent, serde_json::json!({"stage": "run-task-end"}))?;

    Ok(())
}
