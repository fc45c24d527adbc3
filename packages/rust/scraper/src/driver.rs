//! Optional chromedriver child process owned by orgenrich.

use std::process::Stdio;
use std::time::Duration;

use orgenrich_shared::{EnrichError, Result};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::webdriver::WebDriver;

/// How long a freshly spawned driver gets to report ready.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// A spawned WebDriver server, killed when dropped.
#[derive(Debug)]
pub struct DriverProcess {
    child: Child,
    command: String,
}

impl DriverProcess {
    /// Spawn `command_line` (split on whitespace) and wait until `webdriver`
    /// answers `GET /status` with `ready: true`.
    pub async fn spawn(command_line: &str, webdriver: &WebDriver) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| EnrichError::config("browser.driver_command is empty"))?;

        info!(command = %command_line, "spawning WebDriver server");

        let child = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EnrichError::Browser(format!(
                    "failed to spawn '{command_line}': {e}. Is `{program}` installed?"
                ))
            })?;

        let mut process = Self {
            child,
            command: command_line.to_string(),
        };

        if let Err(e) = webdriver.wait_ready(STARTUP_TIMEOUT).await {
            process.shutdown().await;
            return Err(e);
        }

        Ok(process)
    }

    /// Kill the driver and reap it.
    pub async fn shutdown(&mut self) {
        match self.child.kill().await {
            Ok(()) => info!(command = %self.command, "WebDriver server stopped"),
            Err(e) => warn!(command = %self.command, error = %e, "failed to stop WebDriver server"),
        }
    }
}
