//! Common utilities and types shared across replikv

pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod storage;
pub mod tracing_middleware;
pub mod utils;

pub use config::{normalize_addr, NodeConfig};
pub use error::{Error, Result};
pub use hash::{crc32, key_digest, key_hash};
pub use metrics::Metrics;
pub use storage::{FileStore, KvStore, MemStore, Record, Storage};
pub use utils::timestamp_now_millis;
