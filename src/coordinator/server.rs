//! Node server
//!
//! A node owns its storage, its coordinator and its listener. Nothing is
//! process-global: several nodes can run in one process (the cluster
//! launcher and the integration tests do exactly that).

use crate::common::{NodeConfig, Result, Storage};
use crate::coordinator::http::{create_router, NodeState};
use crate::coordinator::replica_client::ReplicaClient;
use crate::coordinator::service::Coordinator;
use crate::coordinator::topology::Topology;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Node {
    config: NodeConfig,
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
}

impl Node {
    /// Open storage from the config and bind the configured address
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        let storage = match &config.data_dir {
            Some(dir) => Storage::open_dir(dir)?,
            None => Storage::new_memory(),
        };
        let listener = TcpListener::bind(config.bind_addr).await?;
        Self::from_parts(config, storage, listener)
    }

    /// Build a node around an existing storage and an already bound listener
    pub fn from_parts(config: NodeConfig, storage: Storage, listener: TcpListener) -> Result<Self> {
        config.validate()?;

        let topology = Topology::new(&config.topology)?;
        let client = ReplicaClient::new(&config.advertise, storage, config.replica_timeout())?;
        let coordinator = Arc::new(Coordinator::new(
            topology,
            client,
            config.request_timeout(),
            config.read_repair,
        )?);

        Ok(Self {
            config,
            listener,
            coordinator,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    /// Serve until `shutdown` resolves, then drain open connections
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        tracing::info!("Starting node: {}", self.config.advertise);
        tracing::info!("  HTTP API: {}", addr);
        tracing::info!("  Topology: {} nodes", self.coordinator.topology().len());
        match &self.config.data_dir {
            Some(dir) => tracing::info!("  Data path: {}", dir.display()),
            None => tracing::info!("  Data path: <memory>"),
        }
        tracing::info!(
            "  Timeouts: replica {}ms, request {}ms",
            self.config.replica_timeout_ms,
            self.config.request_timeout_ms
        );

        let router = create_router(NodeState {
            coordinator: self.coordinator.clone(),
        });

        tracing::info!("✓ Node ready");

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Node {} stopped", self.config.advertise);
        Ok(())
    }
}
