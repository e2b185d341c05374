//! Node binary

use clap::{Parser, Subcommand};
use replikv::{Node, NodeConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "replikv-node")]
#[command(about = "replikv storage node with quorum replication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Serve {
        /// TOML config file (CLI flags take priority)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<String>,

        /// This node's address as it appears in the topology
        #[arg(long)]
        advertise: Option<String>,

        /// All cluster nodes (comma-separated)
        #[arg(long, value_delimiter = ',')]
        topology: Vec<String>,

        /// Data directory (in-memory if omitted)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Per-replica timeout in milliseconds
        #[arg(long)]
        replica_timeout_ms: Option<u64>,

        /// Per-request timeout in milliseconds
        #[arg(long)]
        request_timeout_ms: Option<u64>,

        /// Disable read repair
        #[arg(long)]
        no_read_repair: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            advertise,
            topology,
            data,
            replica_timeout_ms,
            request_timeout_ms,
            no_read_repair,
        } => {
            let mut node_config = NodeConfig::load(config.as_deref())?;
            if let Some(bind) = bind {
                node_config.bind_addr = bind.parse()?;
                if advertise.is_none() && config.is_none() {
                    node_config.advertise =
                        format!("http://localhost:{}", node_config.bind_addr.port());
                }
            }
            if let Some(advertise) = advertise {
                node_config.advertise = advertise;
            }
            if !topology.is_empty() {
                node_config.topology = topology;
            } else if config.is_none() {
                node_config.topology = vec![node_config.advertise.clone()];
            }
            if data.is_some() {
                node_config.data_dir = data;
            }
            if let Some(ms) = replica_timeout_ms {
                node_config.replica_timeout_ms = ms;
            }
            if let Some(ms) = request_timeout_ms {
                node_config.request_timeout_ms = ms;
            }
            if no_read_repair {
                node_config.read_repair = false;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| node_config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let node = Node::bind(node_config).await?;
            node.serve(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;
        }
    }

    Ok(())
}
