//! Test helpers for launch integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use stack_launch::{
    GateConfig, Orchestrator, OrchestratorConfig, ProcessError, ProcessExit, ProcessLauncher,
    ReadinessGate, Registry, ServiceLauncher, ServiceSpec,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Health endpoint served on an ephemeral port with a switchable status
pub struct HealthServer {
    pub port: u16,
    status: Arc<AtomicU16>,
    handle: tokio::task::JoinHandle<()>,
}

impl HealthServer {
    pub async fn start(status: StatusCode) -> Self {
        let status = Arc::new(AtomicU16::new(status.as_u16()));
        let app = Router::new()
            .route("/actuator/health", get(health))
            .with_state(status.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            port,
            status,
            handle,
        }
    }

    pub fn set_status(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::SeqCst);
    }
}

impl Drop for HealthServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn health(State(status): State<Arc<AtomicU16>>) -> StatusCode {
    StatusCode::from_u16(status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
}

/// A port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// One recorded process launch
#[derive(Debug, Clone)]
pub struct Run {
    pub service: String,
    pub working_dir: PathBuf,
    pub at: Instant,
}

/// Records launches instead of spawning processes.
///
/// With `hold` set, each run lasts that long (or until shutdown) so that
/// launches overlap.
#[derive(Default)]
pub struct RecordingLauncher {
    pub runs: Mutex<Vec<Run>>,
    pub hold: Option<Duration>,
}

impl RecordingLauncher {
    pub fn holding(hold: Duration) -> Self {
        Self {
            hold: Some(hold),
            ..Default::default()
        }
    }

    pub fn launched(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.service.clone())
            .collect();
        names.sort();
        names
    }

    pub fn run_of(&self, service: &str) -> Option<Run> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.service == service)
            .cloned()
    }
}

#[async_trait]
impl ProcessLauncher for RecordingLauncher {
    async fn run(
        &self,
        service: &str,
        working_dir: &Path,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<ProcessExit, ProcessError> {
        let started = Instant::now();
        self.runs.lock().unwrap().push(Run {
            service: service.to_string(),
            working_dir: working_dir.to_path_buf(),
            at: started,
        });

        if let Some(hold) = self.hold {
            tokio::select! {
                Ok(()) = shutdown_rx.changed() => {
                    return Ok(ProcessExit::Cancelled { uptime: started.elapsed() });
                }
                _ = tokio::time::sleep(hold) => {}
            }
        }

        Ok(ProcessExit::Exited {
            code: Some(0),
            uptime: started.elapsed(),
        })
    }
}

/// Gate with short intervals against 127.0.0.1
pub fn quick_gate(timeout: Duration) -> ReadinessGate {
    ReadinessGate::new(GateConfig {
        host: "127.0.0.1".to_string(),
        request_timeout: Duration::from_millis(200),
        backoff: Duration::from_millis(25),
        timeout,
        ..Default::default()
    })
    .unwrap()
}

pub fn orchestrator(
    base_dir: &Path,
    timeout: Duration,
    process: Arc<dyn ProcessLauncher>,
) -> Orchestrator {
    let launcher = ServiceLauncher::new(base_dir, quick_gate(timeout), process);
    Orchestrator::new(
        launcher,
        OrchestratorConfig {
            shutdown_grace: Duration::from_secs(1),
        },
    )
}

pub fn registry(specs: Vec<ServiceSpec>) -> Registry {
    specs.into_iter().map(|s| (s.name.clone(), s)).collect()
}

/// Create one directory per name under `base`
pub fn service_dirs(base: &Path, names: &[&str]) {
    for name in names {
        std::fs::create_dir_all(base.join(name)).unwrap();
    }
}
