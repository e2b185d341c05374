//! CLI client for a replikv cluster

use anyhow::Context;
use clap::{Parser, Subcommand};
use reqwest::Client;

#[derive(Parser)]
#[command(name = "replikv")]
#[command(about = "replikv replicated key-value store CLI")]
#[command(version)]
struct Cli {
    /// Node to send requests to (any node can coordinate)
    #[arg(long, default_value = "http://localhost:8080")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a value
    Get {
        key: String,

        /// Quorum as ack/from (majority of the cluster if omitted)
        #[arg(long)]
        replicas: Option<String>,

        /// Write the value to a file instead of stdout
        #[arg(long)]
        output: Option<std::path::PathBuf>,
    },

    /// Create or replace a value
    Put {
        key: String,

        /// Inline value
        #[arg(long, conflicts_with = "file")]
        value: Option<String>,

        /// Read the value from a file
        #[arg(long)]
        file: Option<std::path::PathBuf>,

        #[arg(long)]
        replicas: Option<String>,
    },

    /// Delete a value
    Delete {
        key: String,

        #[arg(long)]
        replicas: Option<String>,
    },

    /// Check that the node is alive
    Status,
}

fn entity_query<'a>(key: &'a str, replicas: &'a Option<String>) -> Vec<(&'static str, &'a str)> {
    let mut query = vec![("id", key)];
    if let Some(r) = replicas {
        query.push(("replicas", r.as_str()));
    }
    query
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = Client::new();
    let node = cli.node.trim_end_matches('/');
    let entity = format!("{}/v0/entity", node);

    match cli.command {
        Commands::Get {
            key,
            replicas,
            output,
        } => {
            let resp = client
                .get(&entity)
                .query(&entity_query(&key, &replicas))
                .send()
                .await?;
            let status = resp.status();
            let body = resp.bytes().await?;
            println!("Status: {}", status);
            if status.is_success() {
                match output {
                    Some(path) => {
                        tokio::fs::write(&path, &body).await?;
                        println!("Wrote {} bytes to {}", body.len(), path.display());
                    }
                    None => println!("{}", String::from_utf8_lossy(&body)),
                }
            }
        }

        Commands::Put {
            key,
            value,
            file,
            replicas,
        } => {
            let body = match (value, file) {
                (Some(v), _) => v.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))?,
                (None, None) => anyhow::bail!("either --value or --file is required"),
            };
            let resp = client
                .put(&entity)
                .query(&entity_query(&key, &replicas))
                .body(body)
                .send()
                .await?;
            println!("Status: {}", resp.status());
        }

        Commands::Delete { key, replicas } => {
            let resp = client
                .delete(&entity)
                .query(&entity_query(&key, &replicas))
                .send()
                .await?;
            println!("Status: {}", resp.status());
        }

        Commands::Status => {
            let resp = client.get(format!("{}/v0/status", node)).send().await?;
            println!("Status: {}", resp.status());
            let body: serde_json::Value = resp.json().await.context("invalid status body")?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
