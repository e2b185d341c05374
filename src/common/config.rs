//! Configuration for replikv nodes

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides (`REPLIKV_BIND_ADDR`, ...)
const ENV_PREFIX: &str = "REPLIKV";

/// Configuration of a single cluster node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bind address for the HTTP API (client-facing and inner)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// This node's own entry in the topology, e.g. `http://localhost:8080`
    pub advertise: String,

    /// Every node of the cluster, including this one
    pub topology: Vec<String>,

    /// Data directory; in-memory storage when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Timeout for one replica call (local or remote)
    #[serde(default = "default_replica_timeout")]
    pub replica_timeout_ms: u64,

    /// Total deadline for one coordinated request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Heal the local replica after a successful read that found it lagging
    #[serde(default = "default_read_repair")]
    pub read_repair: bool,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_replica_timeout() -> u64 {
    5_000
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_read_repair() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        let bind_addr = default_bind_addr();
        let advertise = format!("http://localhost:{}", bind_addr.port());
        Self {
            bind_addr,
            topology: vec![advertise.clone()],
            advertise,
            data_dir: None,
            replica_timeout_ms: default_replica_timeout(),
            request_timeout_ms: default_request_timeout(),
            read_repair: default_read_repair(),
            log_level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Load config from an optional TOML file, then `REPLIKV_*` env vars.
    ///
    /// `REPLIKV_TOPOLOGY` is a comma-separated list.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = NodeConfig::default();
        let mut builder = config::Config::builder()
            .set_default("bind_addr", defaults.bind_addr.to_string())?
            .set_default("advertise", defaults.advertise.clone())?
            .set_default("topology", defaults.topology.clone())?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("topology"),
        );

        let cfg: NodeConfig = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }

    /// Check invariants that would otherwise break placement or timeouts
    pub fn validate(&self) -> Result<()> {
        if self.topology.is_empty() {
            return Err(Error::InvalidConfig("topology is empty".into()));
        }
        let advertise = normalize_addr(&self.advertise);
        if !self.topology.iter().any(|a| normalize_addr(a) == advertise) {
            return Err(Error::InvalidConfig(format!(
                "advertised address {} is not part of the topology",
                self.advertise
            )));
        }
        if self.replica_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.replica_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Canonical form of a node address (no trailing slash, no surrounding spaces)
pub fn normalize_addr(addr: &str) -> String {
    addr.trim().trim_end_matches('/').to_string()
}
