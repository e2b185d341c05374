//! Quorum parameters and the quorum decision
//!
//! Everything here is pure: the coordinator hands over the outcomes of the
//! replicas it contacted and gets back the client-visible verdict.

use crate::common::{Error, Record, Result};
use axum::http::StatusCode;

/// `ack` of `from` replicas must confirm an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumSpec {
    pub ack: usize,
    pub from: usize,
}

impl QuorumSpec {
    /// Validated quorum for a cluster of `n` nodes: `1 <= ack <= from <= n`
    pub fn new(ack: usize, from: usize, n: usize) -> Result<Self> {
        if ack < 1 || from < 1 || ack > from || from > n {
            return Err(Error::InvalidRequest(format!(
                "replicas {}/{} out of range for {} nodes",
                ack, from, n
            )));
        }
        Ok(Self { ack, from })
    }

    /// Majority of the full topology
    pub fn majority(n: usize) -> Self {
        Self {
            ack: n / 2 + 1,
            from: n,
        }
    }

    /// Parse the `replicas=<ack>/<from>` query value; absent means majority
    pub fn parse(raw: Option<&str>, n: usize) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(Self::majority(n));
        };

        let invalid = || Error::InvalidRequest(format!("malformed replicas parameter: {:?}", raw));
        let (ack, from) = raw.split_once('/').ok_or_else(invalid)?;
        // Plain decimal digits only: no sign, no surrounding whitespace
        let number = |part: &str| -> Result<usize> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };
        let ack = number(ack)?;
        let from = number(from)?;

        Self::new(ack, from, n)
    }
}

impl std::fmt::Display for QuorumSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ack, self.from)
    }
}

/// Result of one operation on one replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaOutcome {
    /// Read succeeded
    Found(Record),
    /// Write or delete succeeded
    Ack,
    /// The replica has no value for the key
    NotFound,
    /// Unreachable, timed out, local fault or unexpected status
    Failed(String),
}

impl ReplicaOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReplicaOutcome::Failed(_))
    }
}

/// Client-visible result of a coordinated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Found(Record),
    NotFound,
    Created,
    Accepted,
    InsufficientReplicas { needed: usize, acked: usize },
}

impl Verdict {
    pub fn status(&self) -> StatusCode {
        match self {
            Verdict::Found(_) => StatusCode::OK,
            Verdict::NotFound => StatusCode::NOT_FOUND,
            Verdict::Created => StatusCode::CREATED,
            Verdict::Accepted => StatusCode::ACCEPTED,
            Verdict::InsufficientReplicas { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Classification of a read from its counts alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRule {
    Insufficient,
    NotFound,
    Found,
}

/// `ok` replicas returned a value, `not_found` confirmed absence
pub fn read_rule(ok: usize, not_found: usize, ack: usize) -> ReadRule {
    if ok + not_found < ack {
        ReadRule::Insufficient
    } else if ok < ack {
        ReadRule::NotFound
    } else {
        ReadRule::Found
    }
}

/// Whether `ok` write confirmations satisfy `ack`
pub fn write_rule(ok: usize, ack: usize) -> bool {
    ok >= ack
}

/// Per-kind counts of a set of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub found: usize,
    pub acked: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl Tally {
    pub fn of(outcomes: &[ReplicaOutcome]) -> Self {
        let mut t = Tally::default();
        for outcome in outcomes {
            match outcome {
                ReplicaOutcome::Found(_) => t.found += 1,
                ReplicaOutcome::Ack => t.acked += 1,
                ReplicaOutcome::NotFound => t.not_found += 1,
                ReplicaOutcome::Failed(_) => t.failed += 1,
            }
        }
        t
    }
}

/// Decide a GET.
///
/// On success returns the value with the newest timestamp; on a tie the
/// first one in `outcomes` order wins.
pub fn decide_get(outcomes: &[ReplicaOutcome], quorum: QuorumSpec) -> Verdict {
    let tally = Tally::of(outcomes);
    match read_rule(tally.found, tally.not_found, quorum.ack) {
        ReadRule::Insufficient => Verdict::InsufficientReplicas {
            needed: quorum.ack,
            acked: tally.found + tally.not_found,
        },
        ReadRule::NotFound => Verdict::NotFound,
        ReadRule::Found => {
            let newest = outcomes
                .iter()
                .filter_map(|o| match o {
                    ReplicaOutcome::Found(record) => Some(record),
                    _ => None,
                })
                .fold(None::<&Record>, |best, r| match best {
                    Some(b) if b.timestamp >= r.timestamp => Some(b),
                    _ => Some(r),
                });
            match newest {
                Some(record) => Verdict::Found(record.clone()),
                // read_rule only says Found when found >= ack >= 1
                None => Verdict::NotFound,
            }
        }
    }
}

fn decide_write(outcomes: &[ReplicaOutcome], quorum: QuorumSpec, success: Verdict) -> Verdict {
    let acked = Tally::of(outcomes).acked;
    if write_rule(acked, quorum.ack) {
        success
    } else {
        Verdict::InsufficientReplicas {
            needed: quorum.ack,
            acked,
        }
    }
}

pub fn decide_put(outcomes: &[ReplicaOutcome], quorum: QuorumSpec) -> Verdict {
    decide_write(outcomes, quorum, Verdict::Created)
}

pub fn decide_delete(outcomes: &[ReplicaOutcome], quorum: QuorumSpec) -> Verdict {
    decide_write(outcomes, quorum, Verdict::Accepted)
}
