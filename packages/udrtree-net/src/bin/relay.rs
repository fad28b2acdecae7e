//! `udrtree-relay`: forwards every frame from one replica to all the others.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use udrtree_net::{Relay, RelayConfig};

#[derive(Parser)]
#[command(name = "udrtree-relay", version, about = "Star-topology relay for udrtree replicas")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (host:port).
    #[arg(short, long)]
    listen: Option<String>,

    #[arg(long)]
    max_connections: Option<usize>,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = match &cli.config {
        Some(path) => {
            RelayConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => RelayConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(max) = cli.max_connections {
        config.max_connections = max;
    }

    let relay = Relay::bind(config.clone())
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    let handle = relay.spawn()?;
    info!(addr = %handle.local_addr(), "relay ready");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    handle.shutdown().await?;
    Ok(())
}
