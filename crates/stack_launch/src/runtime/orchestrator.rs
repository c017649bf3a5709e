//! Orchestrator - runs one launch task per enabled service and joins them

use crate::config::Registry;
use crate::runtime::launcher::{LaunchError, Launched, ServiceLauncher};
use crate::runtime::process::ProcessExit;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Time tasks get to wind down after an interrupt before they are aborted
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Terminal state of a service task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// The process ran and exited cleanly, or was stopped on shutdown
    Completed { exit: ProcessExit },
    /// A dependency never became ready
    DependencyTimeout { dependency: String, elapsed: Duration },
    /// The service directory does not exist
    PathNotFound { path: String },
    /// The process failed to start or exited with an error
    LaunchFailed { reason: String },
    /// Shutdown was requested before the task finished
    Cancelled,
}

impl ServiceOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            ServiceOutcome::Completed { .. } | ServiceOutcome::Cancelled
        )
    }
}

impl From<Result<Launched, LaunchError>> for ServiceOutcome {
    fn from(result: Result<Launched, LaunchError>) -> Self {
        match result {
            Ok(launched) => ServiceOutcome::Completed {
                exit: launched.exit,
            },
            Err(LaunchError::DependencyTimeout {
                dependency,
                elapsed,
                ..
            }) => ServiceOutcome::DependencyTimeout {
                dependency,
                elapsed,
            },
            Err(LaunchError::PathNotFound { path, .. }) => ServiceOutcome::PathNotFound {
                path: path.display().to_string(),
            },
            Err(LaunchError::Cancelled(_)) => ServiceOutcome::Cancelled,
            Err(e) => ServiceOutcome::LaunchFailed {
                reason: e.to_string(),
            },
        }
    }
}

/// Outcome of every service considered in a run, in configuration order
#[derive(Debug, Default)]
pub struct RunReport {
    /// Outcome per launched service
    pub outcomes: IndexMap<String, ServiceOutcome>,
    /// Services skipped because they are disabled
    pub disabled: Vec<String>,
    /// Whether the run ended because of an interrupt
    pub interrupted: bool,
}

impl RunReport {
    /// Number of services that failed
    pub fn failures(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_failure()).count()
    }

    pub fn outcome(&self, name: &str) -> Option<&ServiceOutcome> {
        self.outcomes.get(name)
    }
}

/// Launch plan for dry-run mode
#[derive(Debug)]
pub struct LaunchPlan {
    /// Enabled services in configuration order
    pub services: Vec<PlannedService>,
    /// Disabled services
    pub disabled: Vec<String>,
}

/// A service in the launch plan
#[derive(Debug)]
pub struct PlannedService {
    pub name: String,
    pub working_dir: String,
    pub port: Option<u16>,
    /// Dependencies that will be waited on
    pub waits_on: Vec<String>,
    /// Dependencies that are not configured and will be skipped
    pub unknown: Vec<String>,
}

/// Runs every enabled service concurrently
pub struct Orchestrator {
    config: OrchestratorConfig,
    launcher: Arc<ServiceLauncher>,
}

impl Orchestrator {
    pub fn new(launcher: ServiceLauncher, config: OrchestratorConfig) -> Self {
        Self {
            config,
            launcher: Arc::new(launcher),
        }
    }

    /// Describe what a run would do without starting anything
    pub fn plan(&self, registry: &Registry) -> LaunchPlan {
        let mut services = Vec::new();
        let mut disabled = Vec::new();

        for (name, spec) in registry {
            if !spec.is_enabled() {
                disabled.push(name.clone());
                continue;
            }

            let (waits_on, unknown): (Vec<String>, Vec<String>) = spec
                .dependencies()
                .iter()
                .cloned()
                .partition(|dep| registry.contains_key(dep));

            services.push(PlannedService {
                name: name.clone(),
                working_dir: self.launcher.resolve_path(spec).display().to_string(),
                port: spec.port,
                waits_on,
                unknown,
            });
        }

        LaunchPlan { services, disabled }
    }

    /// Launch every enabled service and wait until all tasks end or shutdown
    /// is requested.
    pub async fn run(
        &self,
        registry: Arc<Registry>,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> RunReport {
        let mut report = RunReport::default();
        let mut tasks = JoinSet::new();

        for (name, spec) in registry.iter() {
            if !spec.is_enabled() {
                log::info!("{} disabled, skipping...", name);
                report.disabled.push(name.clone());
                continue;
            }

            let launcher = Arc::clone(&self.launcher);
            let registry = Arc::clone(&registry);
            let task_rx = shutdown_rx.clone();
            let name = name.clone();
            tasks.spawn(async move {
                let Some(spec) = registry.get(&name) else {
                    return (name, ServiceOutcome::Cancelled);
                };
                let result = launcher.launch(spec, &registry, task_rx).await;
                report_result(&name, &result);
                (name, ServiceOutcome::from(result))
            });
        }

        log::info!("Launching {} services...", tasks.len());
        let mut finished: IndexMap<String, ServiceOutcome> = IndexMap::new();

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((name, outcome))) => {
                        finished.insert(name, outcome);
                    }
                    Some(Err(e)) => log::error!("Service task failed: {}", e),
                    None => break,
                },
                Ok(()) = shutdown_rx.changed() => {
                    log::info!("Stopping services...");
                    report.interrupted = true;
                    self.drain(&mut tasks, &mut finished).await;
                    break;
                }
            }
        }

        // Keep configuration order; tasks that never reported were cut short
        for (name, spec) in registry.iter() {
            if !spec.is_enabled() {
                continue;
            }
            let outcome = finished
                .swap_remove(name)
                .unwrap_or(ServiceOutcome::Cancelled);
            report.outcomes.insert(name.clone(), outcome);
        }

        report
    }

    /// Give cancelled tasks the grace period to finish, then abort the rest
    async fn drain(
        &self,
        tasks: &mut JoinSet<(String, ServiceOutcome)>,
        finished: &mut IndexMap<String, ServiceOutcome>,
    ) {
        let deadline = tokio::time::sleep(self.config.shutdown_grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((name, outcome))) => {
                        finished.insert(name, outcome);
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => log::error!("Service task failed: {}", e),
                    None => return,
                },
                _ = &mut deadline => {
                    log::warn!("{} services did not stop in time, aborting", tasks.len());
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return;
                }
            }
        }
    }
}

fn report_result(name: &str, result: &Result<Launched, LaunchError>) {
    match result {
        Ok(launched) => match launched.exit {
            ProcessExit::Exited { uptime, .. } => log::info!(
                "[{}] Process exited after {:.1}s",
                name,
                uptime.as_secs_f64()
            ),
            ProcessExit::Cancelled { uptime } => log::info!(
                "[{}] Process stopped after {:.1}s",
                name,
                uptime.as_secs_f64()
            ),
        },
        Err(LaunchError::Cancelled(_)) => log::info!("[{}] Launch cancelled", name),
        Err(e @ LaunchError::DependencyTimeout { .. }) => log::warn!("[{}] {}", name, e),
        Err(e) => log::error!("[{}] Error: {}", name, e),
    }
}

impl std::fmt::Display for ServiceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceOutcome::Completed {
                exit: ProcessExit::Exited { uptime, .. },
            } => write!(f, "completed after {:.1}s", uptime.as_secs_f64()),
            ServiceOutcome::Completed {
                exit: ProcessExit::Cancelled { uptime },
            } => write!(f, "stopped after {:.1}s", uptime.as_secs_f64()),
            ServiceOutcome::DependencyTimeout {
                dependency,
                elapsed,
            } => write!(
                f,
                "timed out waiting for {} after {:.1}s",
                dependency,
                elapsed.as_secs_f64()
            ),
            ServiceOutcome::PathNotFound { path } => write!(f, "path not found: {}", path),
            ServiceOutcome::LaunchFailed { reason } => write!(f, "launch failed: {}", reason),
            ServiceOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Display the run summary in a human-readable format
impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run Summary")?;
        writeln!(f, "===========")?;
        for (name, outcome) in &self.outcomes {
            writeln!(f, "  {}: {}", name, outcome)?;
        }
        if !self.disabled.is_empty() {
            writeln!(f, "  disabled: {}", self.disabled.join(", "))?;
        }
        write!(
            f,
            "{} services, {} failed",
            self.outcomes.len(),
            self.failures()
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Display the launch plan in a human-readable format
impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;

        writeln!(f)?;
        writeln!(f, "Services:")?;
        for (i, service) in self.services.iter().enumerate() {
            writeln!(f)?;
            writeln!(
                f,
                "  {}. {} {}",
                i + 1,
                service.name,
                service
                    .port
                    .map(|p| format!("[port {}]", p))
                    .unwrap_or_default()
            )?;
            writeln!(f, "     Directory: {}", service.working_dir)?;

            if !service.waits_on.is_empty() {
                writeln!(f, "     Waits on: {}", service.waits_on.join(", "))?;
            }
            if !service.unknown.is_empty() {
                writeln!(f, "     Unknown (skipped): {}", service.unknown.join(", "))?;
            }
        }

        if !self.disabled.is_empty() {
            writeln!(f)?;
            writeln!(f, "Disabled: {}", self.disabled.join(", "))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSpec;
    use crate::runtime::readiness::{GateConfig, ReadinessGate};
    use crate::runtime::CommandLauncher;

    fn orchestrator(base: &std::path::Path) -> Orchestrator {
        let gate = ReadinessGate::new(GateConfig::default()).unwrap();
        let launcher = ServiceLauncher::new(base, gate, Arc::new(CommandLauncher::default()));
        Orchestrator::new(launcher, OrchestratorConfig::default())
    }

    fn registry() -> Registry {
        [
            ServiceSpec::new("a", "svc-a").with_port(8001),
            ServiceSpec::new("b", "svc-b")
                .with_port(8002)
                .with_dependencies(["a", "ghost"]),
            ServiceSpec::new("c", "svc-c").with_enabled(false),
        ]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect()
    }

    #[test]
    fn test_plan() {
        let orchestrator = orchestrator(std::path::Path::new("/srv"));
        let plan = orchestrator.plan(&registry());

        let names: Vec<_> = plan.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(plan.disabled, vec!["c".to_string()]);
        assert_eq!(plan.services[1].waits_on, vec!["a".to_string()]);
        assert_eq!(plan.services[1].unknown, vec!["ghost".to_string()]);

        let text = plan.to_string();
        assert!(text.contains("Waits on: a"));
        assert!(text.contains("Disabled: c"));
    }

    #[test]
    fn test_outcome_from_result() {
        let outcome = ServiceOutcome::from(Err(LaunchError::DependencyTimeout {
            service: "b".to_string(),
            dependency: "a".to_string(),
            elapsed: Duration::from_secs(180),
        }));
        assert!(outcome.is_failure());
        assert_eq!(
            outcome.to_string(),
            "timed out waiting for a after 180.0s"
        );

        let outcome = ServiceOutcome::from(Err(LaunchError::Cancelled("b".to_string())));
        assert_eq!(outcome, ServiceOutcome::Cancelled);
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn test_run_with_nothing_enabled() {
        let orchestrator = orchestrator(std::path::Path::new("/srv"));
        let reg: Registry = [ServiceSpec::new("c", "svc-c").with_enabled(false)]
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        let (_tx, rx) = watch::channel(());

        let report = orchestrator.run(Arc::new(reg), rx).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.disabled, vec!["c".to_string()]);
        assert!(!report.interrupted);
    }
}
