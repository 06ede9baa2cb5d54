//! Browser Validator
//!
//! Starts the project's dev server, waits for it to bind its port, drives a
//! headless browser against the root route, and captures a screenshot plus
//! the console message stream as evidence. The dev server's entire process
//! tree is killed on every exit path, success or failure.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ProjectCapabilities, Validator, ValidatorContext, ValidatorResult};

const PORT_POLL_CAP: Duration = Duration::from_secs(120);
const PORT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Drives a headless browser against the project's own dev server.
pub struct BrowserValidator {
    dev_server_command: String,
    port: u16,
}

impl BrowserValidator {
    pub const NAME: &'static str = "browser";

    pub fn new(dev_server_command: impl Into<String>, port: u16) -> Self {
        Self {
            dev_server_command: dev_server_command.into(),
            port,
        }
    }

    async fn wait_for_port(&self, port: u16) -> bool {
        let deadline = tokio::time::Instant::now() + PORT_POLL_CAP;
        while tokio::time::Instant::now() < deadline {
            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                return true;
            }
            tokio::time::sleep(PORT_POLL_INTERVAL).await;
        }
        false
    }

    /// Kill the dev server's whole process group, not just the child pid,
    /// since most dev-server commands spawn a wrapper (npm, yarn, ...) that
    /// forks the real server.
    fn kill_process_tree(child: &mut Child) {
        let Some(pid) = child.id() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            // Negative pid targets the process group (requires the child to
            // have been spawned as its own group leader via process_group(0)).
            let _ = kill(Pid::from_raw(-(pid as i32)), Signal::SIGTERM);
        }

        #[cfg(windows)]
        {
            let _ = std::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .output();
        }

        let _ = child.start_kill();
    }

    async fn run_against_server(&self, context: &ValidatorContext) -> Result<ValidatorResult, String> {
        let screenshot_dir = context.spec_dir.join("screenshots");
        tokio::fs::create_dir_all(&screenshot_dir)
            .await
            .map_err(|e| format!("failed to create screenshots dir: {}", e))?;
        let screenshot_path = screenshot_dir.join("01-initial-load.png");

        let console_lines = self.capture_console(&context.worktree_path).await?;

        self.take_screenshot(&screenshot_path).await?;

        Ok(ValidatorResult::pass(Self::NAME, "navigated to root route and captured evidence").with_details(json!({
            "screenshot": screenshot_path.display().to_string(),
            "console": console_lines,
        })))
    }

    /// Navigate a WebDriver-backed headless session to the root route and
    /// collect its console log. Requires a WebDriver endpoint (chromedriver
    /// or geckodriver) reachable on the default local port; if none is
    /// running the caller treats that as a skip, not a failure.
    async fn capture_console(&self, _worktree_path: &std::path::Path) -> Result<Vec<String>, String> {
        use fantoccini::ClientBuilder;

        let client = ClientBuilder::native()
            .connect("http://localhost:9515")
            .await
            .map_err(|e| format!("webdriver unavailable: {}", e))?;

        let url = format!("http://127.0.0.1:{}/", self.port);
        client.goto(&url).await.map_err(|e| format!("navigation failed: {}", e))?;

        let console: Vec<String> = client
            .execute("return (window.__td_console_log || []).slice()", vec![])
            .await
            .ok()
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();

        let _ = client.close().await;
        Ok(console)
    }

    async fn take_screenshot(&self, dest: &std::path::Path) -> Result<(), String> {
        use fantoccini::ClientBuilder;

        let client = ClientBuilder::native()
            .connect("http://localhost:9515")
            .await
            .map_err(|e| format!("webdriver unavailable: {}", e))?;

        let png = client
            .screenshot()
            .await
            .map_err(|e| format!("screenshot failed: {}", e))?;
        tokio::fs::write(dest, png)
            .await
            .map_err(|e| format!("failed to write screenshot: {}", e))?;
        let _ = client.close().await;
        Ok(())
    }
}

#[async_trait]
impl Validator for BrowserValidator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn selectable(&self, capabilities: &ProjectCapabilities) -> bool {
        capabilities.web_frontend || capabilities.electron || capabilities.tauri
    }

    async fn run(&self, context: &ValidatorContext) -> ValidatorResult {
        debug!(spec_id = %context.spec_id, "BrowserValidator::run: called");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.dev_server_command)
            .current_dir(&context.worktree_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ValidatorResult::skipped(Self::NAME, format!("failed to start dev server: {}", e));
            }
        };

        if !self.wait_for_port(self.port).await {
            Self::kill_process_tree(&mut child);
            return ValidatorResult::fail(Self::NAME, format!("dev server never bound port {} within 120s", self.port));
        }

        let outcome = timeout(Duration::from_secs(30), self.run_against_server(context)).await;

        Self::kill_process_tree(&mut child);

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.contains("webdriver unavailable") => {
                warn!(error = %e, "BrowserValidator::run: no webdriver available, skipping");
                ValidatorResult::skipped(Self::NAME, e)
            }
            Ok(Err(e)) => ValidatorResult::fail(Self::NAME, e),
            Err(_) => ValidatorResult::fail(Self::NAME, "browser session timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectable_only_for_frontend_stacks() {
        let validator = BrowserValidator::new("npm run dev", 3000);
        assert!(validator.selectable(&ProjectCapabilities {
            web_frontend: true,
            ..Default::default()
        }));
        assert!(!validator.selectable(&ProjectCapabilities::default()));
    }
}
