//! Replication coordinator
//!
//! One entry point per client operation. Each call validates its input,
//! computes the replica set, fans the operation out to every replica in a
//! per-request task group, waits for all of them (or the request deadline),
//! and hands the outcomes to the quorum decision.

use crate::common::{timestamp_now_millis, Error, Metrics, Record, Result};
use crate::coordinator::quorum::{
    decide_delete, decide_get, decide_put, QuorumSpec, ReplicaOutcome, Tally, Verdict,
};
use crate::coordinator::read_repair::{plan_repair, spawn_repair};
use crate::coordinator::replica_client::{ReplicaClient, ReplicaOp};
use crate::coordinator::topology::Topology;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::Instrument;

pub struct Coordinator {
    topology: Topology,
    client: Arc<ReplicaClient>,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
    read_repair: bool,
}

impl Coordinator {
    pub fn new(
        topology: Topology,
        client: ReplicaClient,
        request_timeout: Duration,
        read_repair: bool,
    ) -> Result<Self> {
        if !topology.contains(client.self_addr()) {
            return Err(Error::InvalidConfig(format!(
                "{} is not part of the topology",
                client.self_addr()
            )));
        }
        Ok(Self {
            topology,
            client: Arc::new(client),
            metrics: Arc::new(Metrics::new()),
            request_timeout,
            read_repair,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn client(&self) -> &ReplicaClient {
        &self.client
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Parse and validate `id` and `replicas` of a client request
    pub fn validate(&self, key: Option<&str>, replicas: Option<&str>) -> Result<(String, QuorumSpec)> {
        let checked = match key {
            Some(key) if !key.is_empty() => {
                QuorumSpec::parse(replicas, self.topology.len()).map(|q| (key.to_string(), q))
            }
            _ => Err(Error::InvalidRequest("id is missing or empty".into())),
        };
        if checked.is_err() {
            self.metrics.bad_requests.inc();
        }
        checked
    }

    pub async fn coordinate_get(&self, key: &str, quorum: QuorumSpec) -> Result<Verdict> {
        self.metrics.get_requests.inc();
        let start = Instant::now();
        self.check(key, quorum)?;

        let outcomes = self.fan_out(key, quorum, ReplicaOp::Get).await?;
        let plain: Vec<ReplicaOutcome> = outcomes.iter().map(|(_, o)| o.clone()).collect();
        let verdict = decide_get(&plain, quorum);

        if self.read_repair {
            if let Some(record) = plan_repair(&verdict, &outcomes, &self.client) {
                spawn_repair(
                    self.client.clone(),
                    self.metrics.clone(),
                    key.to_string(),
                    record.clone(),
                );
            }
        }

        self.finish("GET", key, quorum, &plain, &verdict, start);
        Ok(verdict)
    }

    /// Stamps the value with the current time, then writes it everywhere
    pub async fn coordinate_put(&self, key: &str, value: Bytes, quorum: QuorumSpec) -> Result<Verdict> {
        self.metrics.put_requests.inc();
        let start = Instant::now();
        self.check(key, quorum)?;

        let record = Record::new(timestamp_now_millis(), value);
        let outcomes = self.fan_out(key, quorum, ReplicaOp::Put(record)).await?;
        let plain: Vec<ReplicaOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();
        let verdict = decide_put(&plain, quorum);

        self.finish("PUT", key, quorum, &plain, &verdict, start);
        Ok(verdict)
    }

    pub async fn coordinate_delete(&self, key: &str, quorum: QuorumSpec) -> Result<Verdict> {
        self.metrics.delete_requests.inc();
        let start = Instant::now();
        self.check(key, quorum)?;

        let outcomes = self.fan_out(key, quorum, ReplicaOp::Delete).await?;
        let plain: Vec<ReplicaOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();
        let verdict = decide_delete(&plain, quorum);

        self.finish("DELETE", key, quorum, &plain, &verdict, start);
        Ok(verdict)
    }

    /// Re-check preconditions; callers may build a QuorumSpec by hand
    fn check(&self, key: &str, quorum: QuorumSpec) -> Result<()> {
        let checked = if key.is_empty() {
            Err(Error::InvalidRequest("id is empty".into()))
        } else {
            QuorumSpec::new(quorum.ack, quorum.from, self.topology.len()).map(|_| ())
        };
        if checked.is_err() {
            self.metrics.bad_requests.inc();
        }
        checked
    }

    /// Run `op` on every replica of `key` concurrently.
    ///
    /// Returns one outcome per replica, in replica-set order. Replicas still
    /// pending when the request deadline expires are aborted and reported as
    /// failed.
    async fn fan_out(
        &self,
        key: &str,
        quorum: QuorumSpec,
        op: ReplicaOp,
    ) -> Result<Vec<(String, ReplicaOutcome)>> {
        let replicas = self.topology.replicas_for(key, quorum.from)?;
        let deadline = tokio::time::Instant::now() + self.request_timeout;

        let mut tasks = JoinSet::new();
        for (idx, target) in replicas.iter().enumerate() {
            let client = self.client.clone();
            let target = target.clone();
            let key = key.to_string();
            let op = op.clone();
            tasks.spawn(
                async move { (idx, client.invoke(&target, &key, &op).await) }.in_current_span(),
            );
        }
        self.metrics.replica_calls.add(replicas.len() as u64);

        let mut slots: Vec<Option<ReplicaOutcome>> = vec![None; replicas.len()];
        loop {
            let next = tokio::time::timeout_at(deadline, tasks.join_next()).await;
            match next {
                Ok(Some(Ok((idx, outcome)))) => slots[idx] = Some(outcome),
                Ok(Some(Err(e))) => tracing::warn!("Replica task aborted: {}", e),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        key = %key,
                        pending = tasks.len(),
                        "Request deadline of {:?} expired",
                        self.request_timeout
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        Ok(replicas
            .into_iter()
            .zip(slots)
            .map(|(target, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    ReplicaOutcome::Failed("no answer before request deadline".into())
                });
                tracing::debug!(replica = %target, "Replica outcome: {:?}", outcome);
                (target, outcome)
            })
            .collect())
    }

    fn finish(
        &self,
        op: &str,
        key: &str,
        quorum: QuorumSpec,
        outcomes: &[ReplicaOutcome],
        verdict: &Verdict,
        start: Instant,
    ) {
        let tally = Tally::of(outcomes);
        self.metrics.replica_failures.add(tally.failed as u64);
        self.metrics.latency.observe_duration(start.elapsed());

        match verdict {
            Verdict::InsufficientReplicas { needed, acked } => {
                self.metrics.verdict_insufficient.inc();
                tracing::warn!(
                    op,
                    key = %key,
                    replicas = %quorum,
                    failed = tally.failed,
                    "Quorum not reached: {} of {} needed",
                    acked,
                    needed
                );
            }
            Verdict::NotFound => {
                self.metrics.verdict_not_found.inc();
                tracing::debug!(op, key = %key, replicas = %quorum, "Not found");
            }
            _ => {
                self.metrics.verdict_ok.inc();
                tracing::debug!(op, key = %key, replicas = %quorum, "Quorum reached");
            }
        }
    }
}
