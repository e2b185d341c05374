//! Coordinator metrics
//!
//! Plain atomic counters and a latency histogram, rendered in Prometheus
//! text format by `GET /v0/metrics`. One registry per node, owned by the
//! coordinator service.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        Self {
            buckets: (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect(),
            boundaries: boundaries.to_vec(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value (milliseconds)
    pub fn observe(&self, value: f64) {
        let idx = self
            .boundaries
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.boundaries.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_duration(&self, d: Duration) {
        self.observe(d.as_secs_f64() * 1000.0);
    }

    /// Cumulative buckets, last one is +Inf
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.buckets.len());
        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            let bound = self.boundaries.get(i).copied().unwrap_or(f64::INFINITY);
            result.push((bound, cumulative));
        }
        result
    }

    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Per-node coordinator metrics
#[derive(Debug)]
pub struct Metrics {
    pub get_requests: Counter,
    pub put_requests: Counter,
    pub delete_requests: Counter,

    pub verdict_ok: Counter,
    pub verdict_not_found: Counter,
    pub verdict_insufficient: Counter,
    pub bad_requests: Counter,

    pub replica_calls: Counter,
    pub replica_failures: Counter,
    pub read_repairs: Counter,
    pub read_repair_failures: Counter,

    pub latency: Histogram,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            get_requests: Counter::default(),
            put_requests: Counter::default(),
            delete_requests: Counter::default(),
            verdict_ok: Counter::default(),
            verdict_not_found: Counter::default(),
            verdict_insufficient: Counter::default(),
            bad_requests: Counter::default(),
            replica_calls: Counter::default(),
            replica_failures: Counter::default(),
            read_repairs: Counter::default(),
            read_repair_failures: Counter::default(),
            latency: Histogram::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Render in Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# TYPE replikv_requests_total counter");
        for (op, c) in [
            ("get", &self.get_requests),
            ("put", &self.put_requests),
            ("delete", &self.delete_requests),
        ] {
            let _ = writeln!(out, "replikv_requests_total{{op=\"{}\"}} {}", op, c.get());
        }

        let _ = writeln!(out, "# TYPE replikv_verdicts_total counter");
        for (verdict, c) in [
            ("ok", &self.verdict_ok),
            ("not_found", &self.verdict_not_found),
            ("insufficient_replicas", &self.verdict_insufficient),
            ("bad_request", &self.bad_requests),
        ] {
            let _ = writeln!(
                out,
                "replikv_verdicts_total{{verdict=\"{}\"}} {}",
                verdict,
                c.get()
            );
        }

        let _ = writeln!(out, "replikv_replica_calls_total {}", self.replica_calls.get());
        let _ = writeln!(
            out,
            "replikv_replica_failures_total {}",
            self.replica_failures.get()
        );
        let _ = writeln!(out, "replikv_read_repairs_total {}", self.read_repairs.get());
        let _ = writeln!(
            out,
            "replikv_read_repair_failures_total {}",
            self.read_repair_failures.get()
        );

        let _ = writeln!(out, "# TYPE replikv_request_duration_ms histogram");
        for (bound, count) in self.latency.get_buckets() {
            let le = if bound.is_infinite() {
                "+Inf".to_string()
            } else {
                bound.to_string()
            };
            let _ = writeln!(
                out,
                "replikv_request_duration_ms_bucket{{le=\"{}\"}} {}",
                le, count
            );
        }
        let _ = writeln!(out, "replikv_request_duration_ms_sum {}", self.latency.sum());
        let _ = writeln!(
            out,
            "replikv_request_duration_ms_count {}",
            self.latency.count()
        );
        let _ = writeln!(out, "replikv_uptime_seconds {}", self.uptime().as_secs());

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets() {
        let h = Histogram::with_buckets(&[10.0, 100.0]);
        h.observe(5.0);
        h.observe(50.0);
        h.observe(500.0);

        let buckets = h.get_buckets();
        assert_eq!(buckets[0], (10.0, 1));
        assert_eq!(buckets[1], (100.0, 2));
        assert!(buckets[2].0.is_infinite());
        assert_eq!(buckets[2].1, 3);
        assert_eq!(h.count(), 3);
        assert!((h.sum() - 555.0).abs() < 0.01);
    }

    #[test]
    fn test_prometheus_output() {
        let m = Metrics::new();
        m.get_requests.inc();
        m.verdict_insufficient.add(2);
        m.latency.observe(3.0);

        let text = m.to_prometheus();
        assert!(text.contains("replikv_requests_total{op=\"get\"} 1"));
        assert!(text.contains("replikv_verdicts_total{verdict=\"insufficient_replicas\"} 2"));
        assert!(text.contains("replikv_request_duration_ms_bucket{le=\"+Inf\"} 1"));
    }
}
