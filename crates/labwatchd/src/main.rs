//! labwatchd - homelab telemetry aggregator daemon

use anyhow::{Context, Result};
use clap::Parser;
use labwatchd::{server, AppState, Config};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "labwatchd", version, about = "Homelab telemetry aggregator")]
struct Args {
    /// Config file (default: /etc/labwatch/config.toml)
    #[arg(long, env = "LABWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides [server].bind
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("labwatchd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    info!(
        "Throttle {} ms, chaos reset {} s, upstream timeout {} s",
        config.server.throttle_ms, config.server.chaos_reset_secs, config.server.upstream_timeout_secs
    );

    let state = AppState::from_config(&config).context("Failed to initialize daemon")?;
    server::run(state, &bind, &config.server.cors_origins).await
}
