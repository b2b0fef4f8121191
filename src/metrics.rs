// src/metrics.rs
//
// Request metrics for the remote storage adapter
// Counts requests, documents moved through the store and failure causes,
// and keeps a bounded latency sample per endpoint

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const LATENCY_RESERVOIR: usize = 10_000;

/// Global metrics singleton
static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::default()));

pub fn metrics() -> Arc<Metrics> {
    Arc::clone(&METRICS)
}

#[derive(Debug, Default)]
pub struct Metrics {
    // Writes
    pub write_requests: Counter,
    pub documents_written: Counter,
    pub samples_written: Counter,
    pub write_failures: Counter,

    // Reads
    pub read_requests: Counter,
    pub queries_executed: Counter,
    pub series_returned: Counter,
    pub read_failures: Counter,

    // Failure causes
    pub decode_errors: Counter,
    pub compile_errors: Counter,
    pub store_errors: Counter,
    pub store_timeouts: Counter,

    pub write_latency: LatencySample,
    pub read_latency: LatencySample,
}

/// Point-in-time view served on /api/metrics
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub write_requests: u64,
    pub documents_written: u64,
    pub samples_written: u64,
    pub write_failures: u64,
    pub write_failure_rate: f64,
    pub read_requests: u64,
    pub queries_executed: u64,
    pub series_returned: u64,
    pub read_failures: u64,
    pub read_failure_rate: f64,
    pub decode_errors: u64,
    pub compile_errors: u64,
    pub store_errors: u64,
    pub store_timeouts: u64,
    pub write_latency_us: Quantiles,
    pub read_latency_us: Quantiles,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        let write_requests = self.write_requests.get();
        let write_failures = self.write_failures.get();
        let read_requests = self.read_requests.get();
        let read_failures = self.read_failures.get();

        MetricsSnapshot {
            write_requests,
            documents_written: self.documents_written.get(),
            samples_written: self.samples_written.get(),
            write_failures,
            write_failure_rate: ratio(write_failures, write_requests),
            read_requests,
            queries_executed: self.queries_executed.get(),
            series_returned: self.series_returned.get(),
            read_failures,
            read_failure_rate: ratio(read_failures, read_requests),
            decode_errors: self.decode_errors.get(),
            compile_errors: self.compile_errors.get(),
            store_errors: self.store_errors.get(),
            store_timeouts: self.store_timeouts.get(),
            write_latency_us: self.write_latency.quantiles(),
            read_latency_us: self.read_latency.quantiles(),
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Monotonic event count
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Quantiles {
    pub p50: u64,
    pub p99: u64,
}

/// Request latencies in microseconds, bounded by reservoir sampling
#[derive(Debug)]
pub struct LatencySample {
    micros: Mutex<Vec<u64>>,
    capacity: usize,
}

impl Default for LatencySample {
    fn default() -> Self {
        Self::with_capacity(LATENCY_RESERVOIR)
    }
}

impl LatencySample {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            micros: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let value = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let mut micros = self.micros.lock();

        if micros.len() < self.capacity {
            micros.push(value);
        } else {
            let slot = fastrand::usize(..micros.len());
            micros[slot] = value;
        }
    }

    /// Nearest-rank p50 and p99; zero when nothing was observed
    pub fn quantiles(&self) -> Quantiles {
        let mut sorted = self.micros.lock().clone();
        if sorted.is_empty() {
            return Quantiles::default();
        }
        sorted.sort_unstable();

        let rank = |q: f64| sorted[((sorted.len() - 1) as f64 * q) as usize];
        Quantiles {
            p50: rank(0.50),
            p99: rank(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_latency_quantiles() {
        let latency = LatencySample::default();
        assert_eq!(latency.quantiles(), Quantiles::default());

        for i in 1..=100 {
            latency.observe(Duration::from_micros(i));
        }

        let q = latency.quantiles();
        assert!((45..=55).contains(&q.p50));
        assert!((95..=100).contains(&q.p99));
    }

    #[test]
    fn test_latency_reservoir_is_bounded() {
        let latency = LatencySample::with_capacity(8);
        for i in 0..100 {
            latency.observe(Duration::from_millis(i));
        }
        assert_eq!(latency.micros.lock().len(), 8);
    }

    #[test]
    fn test_snapshot_reports_failure_rates() {
        let metrics = Metrics::default();
        let empty = metrics.snapshot();
        assert_eq!(empty.write_failure_rate, 0.0);
        assert_eq!(empty.read_failure_rate, 0.0);

        metrics.write_requests.add(10);
        metrics.write_failures.add(2);
        metrics.read_requests.add(4);
        metrics.read_failures.inc();

        let snapshot = metrics.snapshot();
        assert!((snapshot.write_failure_rate - 0.2).abs() < 1e-9);
        assert_eq!(snapshot.read_failure_rate, 0.25);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = Metrics::default();
        metrics.documents_written.add(3);
        metrics.read_latency.observe(Duration::from_micros(250));

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["documents_written"], 3);
        assert_eq!(json["read_latency_us"]["p50"], 250);
        assert_eq!(json["write_latency_us"]["p99"], 0);
    }

    #[test]
    fn test_counter_across_threads() {
        let counter = Arc::new(Counter::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..500 {
                        counter.inc();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.get(), 4_000);
    }
}
