//! Per-service launch sequence: dependency gating, path resolution, process run

use crate::config::{Registry, ServiceSpec};
use crate::runtime::process::{ProcessError, ProcessExit, ProcessLauncher};
use crate::runtime::readiness::{Readiness, ReadinessGate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A service whose process was launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launched {
    /// Dependencies that were waited on, with the time each took
    pub dependencies_waited: Vec<(String, Duration)>,
    /// Directory the process ran in
    pub working_dir: PathBuf,
    /// How the process ended
    pub exit: ProcessExit,
}

/// Launches one service once its dependencies answer
pub struct ServiceLauncher {
    base_dir: PathBuf,
    gate: ReadinessGate,
    process: Arc<dyn ProcessLauncher>,
}

impl ServiceLauncher {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        gate: ReadinessGate,
        process: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            gate,
            process,
        }
    }

    /// Working directory for a service
    pub fn resolve_path(&self, service: &ServiceSpec) -> PathBuf {
        self.base_dir.join(&service.path)
    }

    /// Run the launch sequence for `service`.
    ///
    /// Each listed dependency found in `registry` is waited on in order; names
    /// not in the registry are skipped. The first dependency that times out
    /// aborts this service.
    pub async fn launch(
        &self,
        service: &ServiceSpec,
        registry: &Registry,
        shutdown_rx: watch::Receiver<()>,
    ) -> Result<Launched, LaunchError> {
        let name = service.name.as_str();
        let mut dependencies_waited = Vec::new();

        for dep_name in service.dependencies() {
            if shutdown_rx.has_changed().unwrap_or(false) {
                return Err(LaunchError::Cancelled(name.to_string()));
            }

            let Some(dependency) = registry.get(dep_name) else {
                log::debug!("[{}] Skipping unknown dependency '{}'", name, dep_name);
                continue;
            };
            let Some(port) = dependency.port else {
                log::warn!(
                    "[{}] Dependency '{}' has no port to check, skipping",
                    name,
                    dep_name
                );
                continue;
            };

            log::info!("[{}] Waiting for {} to be ready...", name, dep_name);
            match self.gate.wait(port, shutdown_rx.clone()).await {
                Readiness::Ready { attempts, elapsed } => {
                    log::info!(
                        "[{}] {} is ready after {:.1}s ({} attempts)",
                        name,
                        dep_name,
                        elapsed.as_secs_f64(),
                        attempts
                    );
                    dependencies_waited.push((dep_name.clone(), elapsed));
                }
                Readiness::TimedOut { elapsed, .. } => {
                    return Err(LaunchError::DependencyTimeout {
                        service: name.to_string(),
                        dependency: dep_name.clone(),
                        elapsed,
                    });
                }
                Readiness::Cancelled => return Err(LaunchError::Cancelled(name.to_string())),
            }
        }

        log::info!("[{}] Starting...", name);
        let working_dir = self.resolve_path(service);
        if !working_dir.is_dir() {
            return Err(LaunchError::PathNotFound {
                service: name.to_string(),
                path: working_dir,
            });
        }

        if shutdown_rx.has_changed().unwrap_or(false) {
            return Err(LaunchError::Cancelled(name.to_string()));
        }

        let exit = self.process.run(name, &working_dir, shutdown_rx).await?;
        match exit {
            ProcessExit::Exited { code, .. } if code != Some(0) => {
                Err(LaunchError::ExitedWithFailure {
                    service: name.to_string(),
                    code,
                })
            }
            _ => Ok(Launched {
                dependencies_waited,
                working_dir,
                exit,
            }),
        }
    }
}

/// Reasons a single service's launch ended early or failed
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Timeout waiting for '{dependency}' after {:.1}s. Aborting '{service}'", .elapsed.as_secs_f64())]
    DependencyTimeout {
        service: String,
        dependency: String,
        elapsed: Duration,
    },

    #[error("Path not found for '{service}': {}", .path.display())]
    PathNotFound { service: String, path: PathBuf },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Process for '{service}' exited with code {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "none (signal)".to_string()))]
    ExitedWithFailure { service: String, code: Option<i32> },

    #[error("Launch of '{0}' cancelled")]
    Cancelled(String),
}
