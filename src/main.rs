use anyhow::{Context, Result};
use container_runner::cli::{Args, ConfigDiscovery, DispatchConfig, ExecutionMode};
use container_runner::env;
use container_runner::hook;
use container_runner::reconciler::StateStore;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env(env::LOG_LEVEL_VAR)
        .unwrap_or_else(|_| EnvFilter::new("container_runner=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match mode {
        ExecutionMode::Dispatch(config) => run_dispatch(config).await,
        ExecutionMode::Status { unit_dir } => show_status(&unit_dir).await,
        ExecutionMode::ShowConfig { unit_dir } => {
            ConfigDiscovery::show_discovery_info(&unit_dir);
            Ok(())
        }
    }
}

async fn run_dispatch(config: DispatchConfig) -> Result<()> {
    info!("Starting Container Runner for event {}", config.event);

    let charm_config = ConfigDiscovery::load(config.config_override.as_deref(), &config.unit_dir)
        .context("Failed to load configuration")?;

    let state = hook::dispatch(config.event, &config.unit_dir, charm_config).await?;
    println!("{}", state.status);

    if state.status.is_blocked() {
        error!("Unit is blocked: {}", state.status);
    }
    Ok(())
}

async fn show_status(unit_dir: &Path) -> Result<()> {
    let store = StateStore::for_unit(unit_dir);
    let state = store.load().await?;

    println!("Unit directory: {}", unit_dir.display());
    println!("Phase: {:?}", state.phase);
    println!("Status: {}", state.status);
    println!("Installed: {}", state.installed);
    if let Some(port) = state.opened_port {
        println!("Opened port: {}/tcp", port);
    }
    if let Some(spec) = &state.applied_spec {
        println!(
            "Container: {} ({}:{}, {} env vars)",
            spec.image,
            spec.host_port,
            spec.container_port,
            spec.env.len()
        );
    }
    if let (Some(event), Some(at)) = (state.last_event, state.updated_at) {
        println!("Last event: {} at {}", event, at.to_rfc3339());
    }
    Ok(())
}
