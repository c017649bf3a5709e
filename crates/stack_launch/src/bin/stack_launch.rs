//! Stack Launch CLI
//!
//! Usage:
//!   stack_launch
//!   stack_launch -d ../services --disable billing --enable orders --save
//!   stack_launch --dry-run

use anyhow::Context;
use stack_launch::{
    CommandLauncher, ConfigSource, ConfigStore, FileSource, GateConfig, LaunchArgs, Orchestrator,
    OrchestratorConfig, ReadinessGate, ServiceLauncher,
};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    if let Err(e) = run(args).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: LaunchArgs) -> anyhow::Result<()> {
    // Load configuration and apply this run's overrides
    let mut store = ConfigStore::load_or_empty(FileSource::new(&args.config))
        .with_context(|| format!("Failed to load configuration '{}'", args.config))?;

    let unknown = store.apply(&args.disabled_services(), &args.enabled_services());
    for name in unknown {
        log::warn!("Unknown service '{}', ignoring", name);
    }

    if args.should_save() {
        store.persist().context("Failed to save configuration")?;
    } else if args.save {
        log::info!("Dry run, not saving {}", store.source().describe());
    }

    let registry = store.into_registry();

    // Build the launch pipeline
    let gate = ReadinessGate::new(GateConfig {
        timeout: args.dependency_timeout(),
        ..Default::default()
    })
    .context("Failed to create HTTP client")?;

    let command = CommandLauncher::from_command_line(&args.command)
        .with_context(|| format!("Invalid command '{}'", args.command))?;

    let launcher = ServiceLauncher::new(&args.dir, gate, Arc::new(command));
    let orchestrator = Orchestrator::new(launcher, OrchestratorConfig::default());

    // Dry run mode
    if args.dry_run {
        println!("{}", orchestrator.plan(&registry));
        return Ok(());
    }

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    {
        let shutdown_tx = shutdown_tx.clone();
        ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, initiating shutdown...");
            let _ = shutdown_tx.send(());
        })
        .context("Error setting Ctrl+C handler")?;
    }

    let report = orchestrator.run(registry, shutdown_rx).await;
    println!("{}", report);

    drop(shutdown_tx);
    log::info!("Stack launcher exiting");
    Ok(())
}
