//! Stack Launch
//!
//! Starts a set of local services, each backed by a long-running process,
//! in dependency order.
//!
//! # Overview
//!
//! - Services and their dependencies are declared in a YAML file
//! - Every enabled service gets its own task; a task waits until each of its
//!   dependencies answers on its health endpoint, then runs the service's
//!   command in its directory
//! - A dependency that never answers aborts only the services waiting on it
//! - Services can be enabled or disabled from the command line, for one run
//!   or saved back to the file
//!
//! Dependency cycles are not detected: every service in a cycle waits for the
//! full timeout and then reports the dependency it was waiting on.
//!
//! # Example Configuration
//!
//! ```yaml
//! config-server:
//!   path: config-server
//!   port: 8888
//!
//! orders:
//!   path: orders-service
//!   port: 8081
//!   dependencies:
//!     - config-server
//!
//! billing:
//!   path: billing-service
//!   port: 8082
//!   dependencies: [config-server, orders]
//!   enabled: false
//! ```

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{ConfigError, ConfigSource, ConfigStore, FileSource, Registry, ServiceSpec};
pub use runtime::{
    CommandLauncher, GateConfig, LaunchError, LaunchPlan, Launched, Orchestrator,
    OrchestratorConfig, ProcessError, ProcessExit, ProcessLauncher, Readiness, ReadinessGate,
    RunReport, ServiceLauncher, ServiceOutcome,
};
