//! Read repair of the local replica
//!
//! After a read reached quorum, a local copy that reported "not found" while
//! the others had the value is rewritten in the background. Only the local
//! replica is healed; remote lagging replicas are left to later reads served
//! by their own nodes.

use crate::common::{Metrics, Record};
use crate::coordinator::quorum::{ReplicaOutcome, Verdict};
use crate::coordinator::replica_client::ReplicaClient;
use std::sync::Arc;
use tracing::Instrument;

/// Decide whether the local replica should be healed after a read.
///
/// `outcomes` pairs each replica address with what it answered. Repair is
/// due when the verdict is `Found`, exactly one replica reported
/// `NotFound`, and that replica is this node.
pub fn plan_repair<'a>(
    verdict: &'a Verdict,
    outcomes: &[(String, ReplicaOutcome)],
    client: &ReplicaClient,
) -> Option<&'a Record> {
    let Verdict::Found(record) = verdict else {
        return None;
    };

    let mut missing = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, ReplicaOutcome::NotFound));
    let lagging = missing.next()?;
    if missing.next().is_some() {
        return None;
    }

    let any_found = outcomes
        .iter()
        .any(|(_, o)| matches!(o, ReplicaOutcome::Found(_)));
    if !any_found || !client.is_local(&lagging.0) {
        return None;
    }

    Some(record)
}

/// Write `record` to the local replica without blocking the caller.
///
/// The write is conditional: a newer record that reached the local replica
/// after the read is kept. Failures are counted and logged, never reported.
pub fn spawn_repair(
    client: Arc<ReplicaClient>,
    metrics: Arc<Metrics>,
    key: String,
    record: Record,
) -> tokio::task::JoinHandle<()> {
    metrics.read_repairs.inc();
    tokio::spawn(
        async move {
            match client.repair_local(&key, record).await {
                Ok(true) => {
                    tracing::info!(key = %key, "Read repair healed local replica");
                }
                Ok(false) => {
                    tracing::debug!(key = %key, "Read repair skipped, local copy is newer");
                }
                Err(e) => {
                    metrics.read_repair_failures.inc();
                    tracing::debug!(key = %key, "Read repair failed: {}", e);
                }
            }
        }
        .in_current_span(),
    )
}
