use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::histogram::LatencyHistogram;

/// Minimum elapsed window before RPS is reported, per spec.md §4.2: "RPS
/// computed over sub-100 ms intervals amplifies jitter into meaningless
/// values."
const MIN_ELAPSED_FOR_RPS: Duration = Duration::from_millis(100);

/// Per-endpoint (or overall) aggregation unit: counters, latency
/// summary, histogram, and status-code breakdown (spec.md §3 "Bucket").
#[derive(Debug, Clone)]
pub struct Bucket {
    successes: u64,
    failures: u64,
    /// 0 means unset.
    min_us: u64,
    max_us: u64,
    sum_us: u128,
    histogram: LatencyHistogram,
    /// protocol -> status code -> count. Populated only on failure with
    /// non-empty protocol and code.
    status_buckets: HashMap<String, HashMap<String, u64>>,
}

impl Bucket {
    pub fn new() -> Self {
        Self {
            successes: 0,
            failures: 0,
            min_us: 0,
            max_us: 0,
            sum_us: 0,
            histogram: LatencyHistogram::new(),
            status_buckets: HashMap::new(),
        }
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Records one outcome. `protocol`/`status_code` are only consulted
    /// on failure.
    pub fn record(&mut self, latency: Duration, error: Option<&str>, protocol: &str, status_code: &str) {
        let us = latency.as_micros().min(u128::from(u64::MAX)) as u64;

        if us > 0 {
            self.histogram.record(us);
        }
        self.sum_us += us as u128;

        if self.min_us == 0 || us < self.min_us {
            // A genuine zero-latency sample would tie with "unset"; since
            // 0 already has no latency to report, treating it as unset is
            // harmless and matches spec.md's "0 => unset" convention.
            if us > 0 || self.min_us == 0 {
                self.min_us = us;
            }
        }
        if us > self.max_us {
            self.max_us = us;
        }

        match error {
            None => self.successes += 1,
            Some(_) => {
                self.failures += 1;
                if !protocol.is_empty() && !status_code.is_empty() {
                    *self
                        .status_buckets
                        .entry(protocol.to_string())
                        .or_default()
                        .entry(status_code.to_string())
                        .or_insert(0) += 1;
                }
            }
        }
    }

    /// Elementwise merge, preserved across an arbitrary number of
    /// shards/workers (associative and commutative).
    pub fn merge(&mut self, other: &Bucket) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.sum_us += other.sum_us;

        if other.min_us != 0 && (self.min_us == 0 || other.min_us < self.min_us) {
            self.min_us = other.min_us;
        }
        if other.max_us > self.max_us {
            self.max_us = other.max_us;
        }

        self.histogram.merge(&other.histogram);

        for (protocol, codes) in &other.status_buckets {
            let entry = self.status_buckets.entry(protocol.clone()).or_default();
            for (code, count) in codes {
                *entry.entry(code.clone()).or_insert(0) += count;
            }
        }
    }

    /// Freezes this bucket into a reportable snapshot, given the elapsed
    /// duration to derive RPS from.
    pub fn snapshot(&self, elapsed: Duration) -> EndpointStats {
        let total = self.total();
        let mean_us = if total > 0 {
            self.sum_us as f64 / total as f64
        } else {
            0.0
        };

        let rps = if total > 0 && elapsed >= MIN_ELAPSED_FOR_RPS {
            total as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        EndpointStats {
            total,
            successes: self.successes,
            failures: self.failures,
            min_latency_us: self.min_us,
            max_latency_us: self.max_us,
            mean_latency_us: mean_us,
            p50_latency_us: self.histogram.value_at_quantile(50.0),
            p90_latency_us: self.histogram.value_at_quantile(90.0),
            p95_latency_us: self.histogram.value_at_quantile(95.0),
            p99_latency_us: self.histogram.value_at_quantile(99.0),
            min_latency_ms: self.min_us as f64 / 1000.0,
            max_latency_ms: self.max_us as f64 / 1000.0,
            mean_latency_ms: mean_us / 1000.0,
            p50_latency_ms: self.histogram.value_at_quantile(50.0) as f64 / 1000.0,
            p90_latency_ms: self.histogram.value_at_quantile(90.0) as f64 / 1000.0,
            p95_latency_ms: self.histogram.value_at_quantile(95.0) as f64 / 1000.0,
            p99_latency_ms: self.histogram.value_at_quantile(99.0) as f64 / 1000.0,
            requests_per_sec: rps,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            elapsed,
            status_buckets: self.status_buckets.clone(),
        }
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

/// A frozen snapshot of one `Bucket`, with all derived fields
/// pre-computed for reporting (spec.md §3 "EndpointStats").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStats {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,

    pub min_latency_us: u64,
    pub max_latency_us: u64,
    pub mean_latency_us: f64,
    pub p50_latency_us: u64,
    pub p90_latency_us: u64,
    pub p95_latency_us: u64,
    pub p99_latency_us: u64,

    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub mean_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p90_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,

    pub requests_per_sec: f64,
    /// Run/bucket duration in milliseconds (spec.md §6's stable `Stats`
    /// schema), derived from `elapsed` at snapshot time.
    pub duration_ms: f64,
    #[serde(skip)]
    pub elapsed: Duration,

    pub status_buckets: HashMap<String, HashMap<String, u64>>,
}

// `elapsed` is a transient wall-clock field excluded from the wire
// schema (`#[serde(skip)]`); a deserialized snapshot always carries
// `Duration::ZERO` there regardless of the original value, so equality
// compares every other field and ignores it. This is what makes the
// `decode(encode(stats)) == stats` property (spec.md §8) hold.
impl PartialEq for EndpointStats {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total
            && self.successes == other.successes
            && self.failures == other.failures
            && self.min_latency_us == other.min_latency_us
            && self.max_latency_us == other.max_latency_us
            && self.mean_latency_us == other.mean_latency_us
            && self.p50_latency_us == other.p50_latency_us
            && self.p90_latency_us == other.p90_latency_us
            && self.p95_latency_us == other.p95_latency_us
            && self.p99_latency_us == other.p99_latency_us
            && self.min_latency_ms == other.min_latency_ms
            && self.max_latency_ms == other.max_latency_ms
            && self.mean_latency_ms == other.mean_latency_ms
            && self.p50_latency_ms == other.p50_latency_ms
            && self.p90_latency_ms == other.p90_latency_ms
            && self.p95_latency_ms == other.p95_latency_ms
            && self.p99_latency_ms == other.p99_latency_ms
            && self.requests_per_sec == other.requests_per_sec
            && self.duration_ms == other.duration_ms
            && self.status_buckets == other.status_buckets
    }
}

impl EndpointStats {
    /// `failures / total`, 0 when `total == 0` (used by the threshold
    /// evaluator for `http_req_failed:rate`).
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failures as f64 / self.total as f64
        }
    }

    /// Status buckets flattened to the stable order spec.md §6 mandates:
    /// sort by count descending, ties broken by protocol then code
    /// ascending.
    pub fn flattened_status_buckets(&self) -> Vec<(String, String, u64)> {
        let mut flat: Vec<(String, String, u64)> = Vec::new();
        for (protocol, codes) in &self.status_buckets {
            for (code, count) in codes {
                flat.push((protocol.clone(), code.clone(), *count));
            }
        }
        flat.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_equals_successes_plus_failures() {
        let mut b = Bucket::new();
        b.record(Duration::from_millis(10), None, "", "");
        b.record(Duration::from_millis(20), Some("timeout"), "http", "503");
        b.record(Duration::from_millis(5), None, "", "");
        assert_eq!(b.total(), b.snapshot(Duration::from_secs(1)).total);
        assert_eq!(b.snapshot(Duration::from_secs(1)).total, 3);
        assert_eq!(b.snapshot(Duration::from_secs(1)).successes, 2);
        assert_eq!(b.snapshot(Duration::from_secs(1)).failures, 1);
    }

    #[test]
    fn rps_is_zero_below_100ms_elapsed() {
        let mut b = Bucket::new();
        for _ in 0..50 {
            b.record(Duration::from_millis(1), None, "", "");
        }
        let snap = b.snapshot(Duration::from_millis(50));
        assert_eq!(snap.requests_per_sec, 0.0);

        let snap2 = b.snapshot(Duration::from_millis(500));
        assert!(snap2.requests_per_sec > 0.0);
    }

    #[test]
    fn status_buckets_only_recorded_on_failure_with_both_fields() {
        let mut b = Bucket::new();
        b.record(Duration::from_millis(1), Some("err"), "", "503");
        b.record(Duration::from_millis(1), Some("err"), "http", "");
        b.record(Duration::from_millis(1), Some("err"), "http", "503");
        let snap = b.snapshot(Duration::from_secs(1));
        let flat = snap.flattened_status_buckets();
        assert_eq!(flat, vec![("http".to_string(), "503".to_string(), 1)]);
    }

    #[test]
    fn merge_is_order_independent() {
        let mut a = Bucket::new();
        a.record(Duration::from_millis(10), None, "", "");
        a.record(Duration::from_millis(20), Some("e"), "http", "500");

        let mut b = Bucket::new();
        b.record(Duration::from_millis(5), None, "", "");

        let mut merged1 = a.clone();
        merged1.merge(&b);
        let mut merged2 = b.clone();
        merged2.merge(&a);

        let s1 = merged1.snapshot(Duration::from_secs(1));
        let s2 = merged2.snapshot(Duration::from_secs(1));
        assert_eq!(s1.total, s2.total);
        assert_eq!(s1.min_latency_us, s2.min_latency_us);
        assert_eq!(s1.max_latency_us, s2.max_latency_us);
        assert_eq!(s1.p99_latency_us, s2.p99_latency_us);
    }
}
