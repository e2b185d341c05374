//! Cluster topology and replica placement
//!
//! The topology is the fixed set of node addresses every process is started
//! with. Placement walks that set from a key-derived start index:
//! replica `i` of a key is `nodes[(hash(key) + i) mod N]`.
//!
//! The node list is sorted at construction. Two processes given the same set
//! in a different order therefore still agree on every replica set, which is
//! what lets a coordinator on any node find the copies written by a
//! coordinator on any other.

use crate::common::{key_hash, normalize_addr, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<String>,
}

// Never empty: construction rejects an empty node set
#[allow(clippy::len_without_is_empty)]
impl Topology {
    /// Build a topology from the cluster's address set.
    ///
    /// Addresses are normalized, deduplicated and sorted.
    pub fn new<I, S>(addrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut nodes: Vec<String> = addrs
            .into_iter()
            .map(|a| normalize_addr(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();
        nodes.sort();
        nodes.dedup();

        if nodes.is_empty() {
            return Err(Error::InvalidConfig("topology must contain at least one node".into()));
        }
        Ok(Self { nodes })
    }

    /// Number of nodes (N)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn contains(&self, addr: &str) -> bool {
        let addr = normalize_addr(addr);
        self.nodes.binary_search(&addr).is_ok()
    }

    /// Ordered replica set of `from` distinct nodes for `key`
    pub fn replicas_for(&self, key: &str, from: usize) -> Result<Vec<String>> {
        if from == 0 || from > self.nodes.len() {
            return Err(Error::InvalidRequest(format!(
                "replication width {} outside 1..={}",
                from,
                self.nodes.len()
            )));
        }

        let n = self.nodes.len() as u64;
        let start = key_hash(key) % n;
        Ok((0..from as u64)
            .map(|i| self.nodes[((start + i) % n) as usize].clone())
            .collect())
    }

    /// First replica of `key`
    pub fn primary_for(&self, key: &str) -> Result<String> {
        let mut replicas = self.replicas_for(key, 1)?;
        Ok(replicas.swap_remove(0))
    }
}
