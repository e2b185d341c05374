//! Replication coordinator
//!
//! The coordinator is responsible for:
//! - Replica placement (fixed topology, key-hash walk)
//! - Concurrent fan-out to local and remote replicas
//! - The ack/from quorum decision
//! - Read repair of the local replica

pub mod http;
pub mod quorum;
pub mod read_repair;
pub mod replica_client;
pub mod server;
pub mod service;
pub mod topology;

pub use quorum::{QuorumSpec, ReplicaOutcome, Verdict};
pub use replica_client::{ReplicaClient, ReplicaOp};
pub use server::Node;
pub use service::Coordinator;
pub use topology::Topology;
