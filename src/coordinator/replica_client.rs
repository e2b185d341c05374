//! Replica invoker
//!
//! Runs one operation for one key against one replica: the local storage
//! engine when the target is this node, otherwise the peer's `/v0/inner`
//! endpoint. Every call is bounded by the replica timeout and every failure
//! becomes [`ReplicaOutcome::Failed`]; nothing here returns an error to the
//! coordinator.

use crate::common::{normalize_addr, Error, Record, Result, Storage};
use crate::coordinator::quorum::ReplicaOutcome;
use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;

/// Path of the node-to-node endpoint
pub const INNER_PATH: &str = "/v0/inner";

/// Header carrying a record's timestamp between nodes
pub const TIMESTAMP_HEADER: &str = "x-replikv-timestamp";

/// Operation sent to a single replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaOp {
    Get,
    Put(Record),
    Delete,
}

impl ReplicaOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReplicaOp::Get => "GET",
            ReplicaOp::Put(_) => "PUT",
            ReplicaOp::Delete => "DELETE",
        }
    }
}

pub struct ReplicaClient {
    http: reqwest::Client,
    storage: Storage,
    self_addr: String,
    timeout: Duration,
}

impl ReplicaClient {
    pub fn new(self_addr: &str, storage: Storage, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            storage,
            self_addr: normalize_addr(self_addr),
            timeout,
        })
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn is_local(&self, target: &str) -> bool {
        normalize_addr(target) == self.self_addr
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Execute `op` for `key` on `target`
    pub async fn invoke(&self, target: &str, key: &str, op: &ReplicaOp) -> ReplicaOutcome {
        let result = if self.is_local(target) {
            self.invoke_local(key, op).await
        } else {
            self.invoke_remote(target, key, op).await
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(replica = %target, op = op.name(), "Replica call failed: {}", e);
                ReplicaOutcome::Failed(e.to_string())
            }
        }
    }

    /// Local storage operation on the blocking pool, bounded by the timeout
    pub async fn invoke_local(&self, key: &str, op: &ReplicaOp) -> Result<ReplicaOutcome> {
        let key = key.to_string();
        let op = op.clone();
        self.run_local(move |storage| apply_local(storage, &key, &op))
            .await
    }

    /// Write `record` locally unless the local copy is already as new.
    ///
    /// Returns whether the record was written.
    pub async fn repair_local(&self, key: &str, record: Record) -> Result<bool> {
        let key = key.to_string();
        self.run_local(move |storage| storage.upsert_if_newer(&key, &record))
            .await
    }

    async fn run_local<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
    {
        let storage = self.storage.clone();
        let task = tokio::task::spawn_blocking(move || f(&storage));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(Error::Timeout(format!(
                "local storage did not answer within {:?}",
                self.timeout
            ))),
        }
    }

    async fn invoke_remote(&self, target: &str, key: &str, op: &ReplicaOp) -> Result<ReplicaOutcome> {
        let url = format!("{}{}", normalize_addr(target), INNER_PATH);
        let request = match op {
            ReplicaOp::Get => self.http.get(&url),
            ReplicaOp::Put(record) => self
                .http
                .put(&url)
                .header(TIMESTAMP_HEADER, record.timestamp)
                .body(record.value.clone()),
            ReplicaOp::Delete => self.http.delete(&url),
        };

        let response = request.query(&[("id", key)]).send().await?;
        let status = response.status();

        match (op, status) {
            (ReplicaOp::Get, StatusCode::OK) => {
                let timestamp = response
                    .headers()
                    .get(TIMESTAMP_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let value: Bytes = response.bytes().await?;
                Ok(ReplicaOutcome::Found(Record { timestamp, value }))
            }
            (ReplicaOp::Get, StatusCode::NOT_FOUND) => Ok(ReplicaOutcome::NotFound),
            (ReplicaOp::Put(_), StatusCode::CREATED) => Ok(ReplicaOutcome::Ack),
            (ReplicaOp::Delete, StatusCode::ACCEPTED) => Ok(ReplicaOutcome::Ack),
            (_, status) => Err(Error::Http(format!(
                "unexpected status {} from {}",
                status, target
            ))),
        }
    }
}

/// Apply `op` to the local storage engine
pub fn apply_local(storage: &Storage, key: &str, op: &ReplicaOp) -> Result<ReplicaOutcome> {
    match op {
        ReplicaOp::Get => match storage.get(key) {
            Ok(record) => Ok(ReplicaOutcome::Found(record)),
            Err(Error::NotFound(_)) => Ok(ReplicaOutcome::NotFound),
            Err(e) => Err(e),
        },
        ReplicaOp::Put(record) => {
            storage.upsert(key, record)?;
            Ok(ReplicaOutcome::Ack)
        }
        ReplicaOp::Delete => {
            storage.delete(key)?;
            Ok(ReplicaOutcome::Ack)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(storage: Storage) -> ReplicaClient {
        ReplicaClient::new("http://127.0.0.1:8080/", storage, Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn test_local_round_trip() {
        let storage = Storage::new_memory();
        let c = client(storage.clone());
        let me = "http://127.0.0.1:8080";
        assert!(c.is_local(me));

        assert_eq!(c.invoke(me, "k", &ReplicaOp::Get).await, ReplicaOutcome::NotFound);

        let record = Record::new(42, &b"value"[..]);
        assert_eq!(
            c.invoke(me, "k", &ReplicaOp::Put(record.clone())).await,
            ReplicaOutcome::Ack
        );
        assert_eq!(storage.get("k").unwrap(), record);
        assert_eq!(
            c.invoke(me, "k", &ReplicaOp::Get).await,
            ReplicaOutcome::Found(record)
        );

        assert_eq!(c.invoke(me, "k", &ReplicaOp::Delete).await, ReplicaOutcome::Ack);
        assert_eq!(c.invoke(me, "k", &ReplicaOp::Delete).await, ReplicaOutcome::Ack);
        assert_eq!(c.invoke(me, "k", &ReplicaOp::Get).await, ReplicaOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_local_fault_is_failure() {
        let c = client(Storage::new_memory());
        let outcome = c.invoke("http://127.0.0.1:8080", "", &ReplicaOp::Get).await;
        assert!(outcome.is_failure());
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_failure() {
        let c = client(Storage::new_memory());
        // Bind then drop to get a port nobody listens on
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let peer = format!("http://127.0.0.1:{}", port);
        assert!(!c.is_local(&peer));

        for op in [ReplicaOp::Get, ReplicaOp::Put(Record::new(1, &b"v"[..])), ReplicaOp::Delete] {
            assert!(c.invoke(&peer, "k", &op).await.is_failure());
        }
    }
}
