//! Local cluster launcher: N nodes sharing one topology in a single process

use anyhow::Context;
use clap::Parser;
use replikv::{Node, NodeConfig};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "replikv-cluster")]
#[command(about = "Start a local replikv cluster")]
struct Args {
    /// Ports of the nodes (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "8080,8081,8082")]
    ports: Vec<u16>,

    /// Host used in advertised addresses
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Root data directory, one sub-directory per node (in-memory if omitted)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    anyhow::ensure!(!args.ports.is_empty(), "at least one port is required");

    let topology: Vec<String> = args
        .ports
        .iter()
        .map(|port| format!("http://{}:{}", args.host, port))
        .collect();

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(args.ports.len());

    for (i, port) in args.ports.iter().enumerate() {
        let config = NodeConfig {
            bind_addr: ([0, 0, 0, 0], *port).into(),
            advertise: topology[i].clone(),
            topology: topology.clone(),
            data_dir: args.data.as_ref().map(|d| d.join(format!("node-{}", port))),
            log_level: args.log_level.clone(),
            ..Default::default()
        };

        tracing::info!("Starting node {} on port {}", i, port);
        let node = Node::bind(config)
            .await
            .with_context(|| format!("failed to start node on port {}", port))?;

        let mut stop = stop_rx.clone();
        handles.push(tokio::spawn(node.serve(async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        })));
    }

    tracing::info!("Cluster of {} nodes is up: {}", handles.len(), topology.join(", "));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Stopping cluster");
    stop_tx.send(true)?;

    for handle in handles {
        if let Err(e) = handle.await? {
            tracing::error!("Node error: {}", e);
        }
    }

    Ok(())
}
