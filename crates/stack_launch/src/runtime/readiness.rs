//! Dependency readiness polling over HTTP

use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Readiness polling configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Host serving the health endpoints
    pub host: String,
    /// Path of the health endpoint
    pub health_path: String,
    /// Timeout for a single health request
    pub request_timeout: Duration,
    /// Pause between unsuccessful attempts
    pub backoff: Duration,
    /// Give up once this much time has passed
    pub timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            health_path: "/actuator/health".to_string(),
            request_timeout: Duration::from_secs(5),
            backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(180),
        }
    }
}

/// Result of waiting on a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The health endpoint answered with an accepted status
    Ready { attempts: u32, elapsed: Duration },
    /// The timeout passed without an accepted answer
    TimedOut { attempts: u32, elapsed: Duration },
    /// Shutdown was requested while waiting
    Cancelled,
}

/// Polls health endpoints until they answer or a timeout passes.
///
/// 503 is accepted alongside 200: a degraded service that still answers is
/// enough to start its dependents.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    config: GateConfig,
    client: reqwest::Client,
}

impl ReadinessGate {
    pub fn new(config: GateConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Health URL for a service listening on `port`
    pub fn health_url(&self, port: u16) -> String {
        format!(
            "http://{}:{}{}",
            self.config.host, port, self.config.health_path
        )
    }

    /// Whether a status code counts as ready
    pub fn is_accepted(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::OK || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
    }

    /// Poll the health endpoint on `port` until it is ready, the timeout
    /// passes, or `shutdown_rx` fires.
    pub async fn wait(&self, port: u16, mut shutdown_rx: watch::Receiver<()>) -> Readiness {
        let url = self.health_url(port);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if shutdown_rx.has_changed().unwrap_or(false) {
                return Readiness::Cancelled;
            }

            attempts += 1;
            let probe = self.client.get(&url).send();
            let ready = tokio::select! {
                Ok(()) = shutdown_rx.changed() => return Readiness::Cancelled,
                response = probe => match response {
                    Ok(resp) => {
                        let status = resp.status();
                        log::trace!("GET {} -> {}", url, status);
                        Self::is_accepted(status)
                    }
                    Err(e) => {
                        log::trace!("GET {} failed: {}", url, e);
                        false
                    }
                },
            };

            let elapsed = started.elapsed();
            if ready {
                return Readiness::Ready { attempts, elapsed };
            }
            if elapsed >= self.config.timeout {
                return Readiness::TimedOut { attempts, elapsed };
            }

            let pause = self.config.backoff.min(self.config.timeout - elapsed);
            tokio::select! {
                Ok(()) = shutdown_rx.changed() => return Readiness::Cancelled,
                _ = tokio::time::sleep(pause) => {}
            }

            if started.elapsed() >= self.config.timeout {
                return Readiness::TimedOut {
                    attempts,
                    elapsed: started.elapsed(),
                };
            }
        }
    }
}
