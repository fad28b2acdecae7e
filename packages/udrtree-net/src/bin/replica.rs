//! `udrtree-replica`: interactive replica connected to a relay.
//!
//! ```text
//! udrtree-replica --id 1 --relay 127.0.0.1:7400
//! udrtree-replica -c replica.toml --replicas 1,2,3
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use udrtree_core::RemovePolicy;
use udrtree_net::{Command, Outcome, Replica, ReplicaConfig};

#[derive(Parser)]
#[command(name = "udrtree-replica", version, about = "Interactive replica of a replicated tree")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replica id; must be unique among all replicas.
    #[arg(long)]
    id: Option<u64>,

    /// Relay address (host:port).
    #[arg(long)]
    relay: Option<String>,

    /// Every replica id in the system, comma separated. Required unless the config file
    /// lists them.
    #[arg(long, value_delimiter = ',')]
    replicas: Vec<u64>,

    #[arg(long)]
    compaction_interval_ms: Option<u64>,

    /// Allow removing a node that is already removed.
    #[arg(long)]
    relaxed_remove: bool,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<ReplicaConfig> {
        let mut config = match &self.config {
            Some(path) => ReplicaConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ReplicaConfig::default(),
        };
        if let Some(id) = self.id {
            config.replica_id = id;
        }
        if let Some(relay) = self.relay {
            config.relay_addr = relay;
        }
        if !self.replicas.is_empty() {
            config.replicas = self.replicas;
        }
        if let Some(ms) = self.compaction_interval_ms {
            config.compaction_interval_ms = ms;
        }
        if self.relaxed_remove {
            config.remove_policy = RemovePolicy::Relaxed;
        }
        Ok(config)
    }
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn prompt(stdout: &mut Stdout) -> Result<()> {
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let config = cli.into_config()?;

    let replica = Replica::connect_relay(&config)
        .await
        .with_context(|| format!("connecting to relay at {}", config.relay_addr))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    prompt(&mut stdout).await?;

    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                prompt(&mut stdout).await?;
                continue;
            }
            Err(err) => {
                eprintln!("{err}");
                prompt(&mut stdout).await?;
                continue;
            }
        };

        match command.execute(&replica).await {
            Ok(Outcome::Quit) => return Ok(()),
            Ok(Outcome::Continue(Some(text))) => {
                stdout.write_all(text.as_bytes()).await?;
                if !text.ends_with('\n') {
                    stdout.write_all(b"\n").await?;
                }
            }
            Ok(Outcome::Continue(None)) => {}
            Err(err) => eprintln!("{err}"),
        }
        prompt(&mut stdout).await?;
    }

    // stdin closed
    replica.close().await?;
    Ok(())
}
