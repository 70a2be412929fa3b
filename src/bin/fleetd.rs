use anyhow::Context;
use fleet_runner::config::{Config, validate_config};
use fleet_runner::network::{LegacyPing, NoopPortMapper, PortMapper};
use fleet_runner::{InstanceContext, InstanceRegistry};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG: &str = "fleet.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::from_file(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    validate_config(&config).context("validating configuration")?;
    tracing::info!(config = %config_path, root = %config.root.display(), "Starting fleetd");

    let port_mapper: Arc<dyn PortMapper> = Arc::new(NoopPortMapper::new());
    let api_port = config.api_port;
    if let Err(e) = port_mapper.open(api_port, "fleetd api").await {
        tracing::warn!(port = api_port, error = %e, "Failed to open API port forward");
    }

    let ctx = InstanceContext::new(config, Arc::clone(&port_mapper), Arc::new(LegacyPing::new()));
    let registry = InstanceRegistry::open(ctx).context("opening instance registry")?;
    tracing::info!(instances = registry.owners().len(), "Fleet ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown requested");

    if !registry.stop_all().await {
        tracing::warn!("Some servers had to be killed");
    }
    if let Err(e) = port_mapper.close(api_port).await {
        tracing::warn!(port = api_port, error = %e, "Failed to close API port forward");
    }

    tracing::info!("fleetd stopped");
    Ok(())
}
