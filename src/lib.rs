//! # replikv
//!
//! A replicated key-value store over HTTP with Dynamo-style tunable quorums:
//! - Fixed topology, deterministic replica placement
//! - Concurrent fan-out to `from` replicas, success once `ack` confirm
//! - Last-writer-wins by coordinator timestamp
//! - Read repair of the local replica
//!
//! ## Architecture
//!
//! ```text
//!              client
//!                │  /v0/entity?id=k&replicas=2/3
//!          ┌─────▼──────┐
//!          │   Node A   │  coordinator for this request
//!          └──┬──────┬──┘
//!   local     │      │  /v0/inner?id=k
//!   storage ◄─┘      ├──────────────┐
//!              ┌─────▼──────┐ ┌─────▼──────┐
//!              │   Node B   │ │   Node C   │
//!              └────────────┘ └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a three-node cluster locally
//! ```bash
//! replikv-cluster --ports 8080,8081,8082
//! ```
//!
//! ### Start a single node
//! ```bash
//! replikv-node serve \
//!   --bind 0.0.0.0:8080 \
//!   --advertise http://node-a:8080 \
//!   --topology http://node-a:8080,http://node-b:8080,http://node-c:8080 \
//!   --data ./node-a-data
//! ```
//!
//! ### Use the CLI
//! ```bash
//! replikv put my-key --value hello --replicas 2/3
//! replikv get my-key --replicas 2/3
//! replikv delete my-key
//! ```

pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use common::{Error, NodeConfig, Result};
pub use coordinator::{Coordinator, Node};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
