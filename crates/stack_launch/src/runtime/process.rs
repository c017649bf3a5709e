//! External process launching

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::watch;

/// Command run in each service directory when none is configured
pub const DEFAULT_COMMAND: &str = "skaffold dev --port-forward";

/// How a launched process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited on its own
    Exited { code: Option<i32>, uptime: Duration },
    /// The process was stopped because shutdown was requested
    Cancelled { uptime: Duration },
}

impl ProcessExit {
    /// Exited on its own with status zero
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessExit::Exited { code: Some(0), .. })
    }
}

/// Runs a long-lived process for a service.
///
/// Implementations receive the working directory explicitly and must apply it
/// to the spawned process only; launches run concurrently.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run the service's process in `working_dir` until it exits or
    /// `shutdown_rx` fires.
    async fn run(
        &self,
        service: &str,
        working_dir: &Path,
        shutdown_rx: watch::Receiver<()>,
    ) -> Result<ProcessExit, ProcessError>;
}

/// Launches a fixed command line in each service directory
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    /// Program to execute
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Time allowed between SIGTERM and a forced kill
    pub stop_timeout: Duration,
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self::from_command_line(DEFAULT_COMMAND).unwrap_or_else(|| Self {
            program: "skaffold".to_string(),
            args: Vec::new(),
            stop_timeout: Duration::from_secs(5),
        })
    }
}

impl CommandLauncher {
    /// Build a launcher from a whitespace separated command line.
    ///
    /// Returns `None` for a blank command line.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            stop_timeout: Duration::from_secs(5),
        })
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// The command line as it would be typed
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    /// Stop the child gracefully (SIGTERM, then SIGKILL after timeout)
    async fn stop(&self, service: &str, child: &mut Child) {
        log::info!("[{}] Stopping process...", service);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                log::info!("[{}] Process exited with code: {:?}", service, status.code());
            }
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", service, e);
            }
            Err(_) => {
                log::warn!("[{}] Process did not exit gracefully, forcing kill", service);
                if let Err(e) = child.kill().await {
                    log::error!("[{}] Failed to kill process: {}", service, e);
                }
            }
        }
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn run(
        &self,
        service: &str,
        working_dir: &Path,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<ProcessExit, ProcessError> {
        log::info!(
            "[{}] Running `{}` in {}",
            service,
            self.command_line(),
            working_dir.display()
        );

        let mut child = self
            .command(working_dir)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                service: service.to_string(),
                working_dir: working_dir.to_path_buf(),
                source: e,
            })?;
        let started = Instant::now();
        log::info!(
            "[{}] Process started with PID: {}",
            service,
            child.id().unwrap_or(0)
        );

        let status: ExitStatus = tokio::select! {
            status = child.wait() => status.map_err(|e| ProcessError::Wait {
                service: service.to_string(),
                source: e,
            })?,
            Ok(()) = shutdown_rx.changed() => {
                self.stop(service, &mut child).await;
                return Ok(ProcessExit::Cancelled { uptime: started.elapsed() });
            }
        };

        Ok(ProcessExit::Exited {
            code: status.code(),
            uptime: started.elapsed(),
        })
    }
}

/// Errors that can occur with launched processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn process for '{service}' in {}: {source}", .working_dir.display())]
    SpawnFailed {
        service: String,
        working_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error waiting for process of '{service}': {source}")]
    Wait {
        service: String,
        #[source]
        source: std::io::Error,
    },
}
