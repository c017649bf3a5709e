//! Command-line interface for stack_launch

use crate::config::DEFAULT_CONFIG_FILE;
use crate::runtime::DEFAULT_COMMAND;
use argh::FromArgs;
use std::time::Duration;

/// Start local services in dependency order
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// base directory holding the service directories (default: .)
    #[argh(option, short = 'd', default = "String::from(\".\")")]
    pub dir: String,

    /// service configuration file (default: ms_configuration.yml)
    #[argh(option, short = 'c', default = "String::from(DEFAULT_CONFIG_FILE)")]
    pub config: String,

    /// disable services for this run: --disable a,b or --disable a --disable b
    #[argh(option)]
    pub disable: Vec<String>,

    /// enable services for this run: --enable a,b or --enable a --enable b
    #[argh(option)]
    pub enable: Vec<String>,

    /// write enable/disable changes back to the configuration file (ignored with --dry-run)
    #[argh(switch)]
    pub save: bool,

    /// seconds to wait for each dependency (default: 180)
    #[argh(option, default = "180")]
    pub timeout: u64,

    /// command run in each service directory (default: skaffold dev --port-forward)
    #[argh(option, default = "String::from(DEFAULT_COMMAND)")]
    pub command: String,

    /// show launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Split repeated, comma-separated service lists into names
fn parse_names(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

impl LaunchArgs {
    /// Services named by `--disable`
    pub fn disabled_services(&self) -> Vec<String> {
        parse_names(&self.disable)
    }

    /// Services named by `--enable`
    pub fn enabled_services(&self) -> Vec<String> {
        parse_names(&self.enable)
    }

    /// Whether enable/disable changes go back to the configuration file.
    ///
    /// A dry run never writes.
    pub fn should_save(&self) -> bool {
        self.save && !self.dry_run
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Log filter, falling back to `info` for unknown levels
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}
