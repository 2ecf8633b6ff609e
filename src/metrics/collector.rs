use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::bucket::EndpointStats;
use super::sharded::ShardedStats;
use crate::sample::{MetricValue, Protocol, Sample};

/// Minimum interval before `DataPoint.current_rps` is computed from a
/// delta (spec.md §4.4, same 100 ms floor as `Bucket::snapshot`).
const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

/// Top-level metrics sink: overall `ShardedStats`, a lazily-populated
/// per-endpoint map, a per-protocol custom-metrics accumulator, and a
/// monotonically growing snapshot history (spec.md §4.4 "Collector").
///
/// Grounded in the teacher's `MetricsCollector` (`metrics/collector.rs`):
/// same `record`/`snapshot` split and `Mutex`-guarded auxiliary state,
/// generalized from one fixed set of histograms to an open endpoint map.
pub struct Collector {
    overall: ShardedStats,
    endpoints: DashMap<String, ShardedStats>,
    protocol_metrics: Mutex<HashMap<String, HashMap<String, MetricValue>>>,
    history: Mutex<Vec<DataPoint>>,
    start: Mutex<Option<Instant>>,
    started: AtomicBool,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            overall: ShardedStats::new(),
            endpoints: DashMap::new(),
            protocol_metrics: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            start: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Records wall-clock start. Idempotent: later calls are no-ops.
    pub fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            *self.start.lock() = Some(Instant::now());
        }
    }

    /// Elapsed time since `start()`, or zero if never started.
    pub fn elapsed(&self) -> Duration {
        self.start
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Records one outcome. Updates the overall bucket unconditionally;
    /// when `sample.endpoint` is non-empty, lazily creates (insert-once,
    /// via `DashMap::entry`) and updates that endpoint's shard set too.
    pub fn record_request(&self, rng: &mut impl Rng, sample: &Sample) {
        self.overall.record(
            rng,
            sample.latency,
            sample.error.as_deref(),
            sample.protocol.as_str(),
            &sample.status_code,
        );

        if !sample.endpoint.is_empty() {
            self.endpoints
                .entry(sample.endpoint.clone())
                .or_insert_with(ShardedStats::new)
                .record(
                    rng,
                    sample.latency,
                    sample.error.as_deref(),
                    sample.protocol.as_str(),
                    &sample.status_code,
                );
        }

        if !sample.custom_metrics.is_empty() {
            self.merge_custom_metrics(sample.protocol, &sample.custom_metrics);
        }
    }

    /// Numeric values accumulate additively; strings last-write-wins; a
    /// numeric-type mismatch with a prior value overwrites rather than
    /// errors (spec.md §4.4).
    fn merge_custom_metrics(&self, protocol: Protocol, metrics: &HashMap<String, MetricValue>) {
        let mut guard = self.protocol_metrics.lock();
        let entry = guard.entry(protocol.as_str().to_string()).or_default();
        for (key, value) in metrics {
            match (entry.get(key), value) {
                (Some(MetricValue::Int(a)), MetricValue::Int(b)) => {
                    entry.insert(key.clone(), MetricValue::Int(a + b));
                }
                (Some(MetricValue::Float(a)), MetricValue::Float(b)) => {
                    entry.insert(key.clone(), MetricValue::Float(a + b));
                }
                _ => {
                    entry.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Snapshots overall + every endpoint + a copy of the protocol
    /// metrics map. Elapsed is computed from wall clock when `start()`
    /// was called; the argument is used as a fallback for tests that
    /// never call `start()`.
    pub fn stats(&self, elapsed_fallback: Duration) -> Stats {
        let elapsed = if self.started.load(Ordering::Acquire) {
            self.elapsed()
        } else {
            elapsed_fallback
        };

        let total = self.overall.snapshot(elapsed);

        let mut endpoints = HashMap::with_capacity(self.endpoints.len());
        for entry in self.endpoints.iter() {
            endpoints.insert(entry.key().clone(), entry.value().snapshot(elapsed));
        }

        let protocol_metrics = self.protocol_metrics.lock().clone();

        Stats {
            total,
            endpoints,
            protocol_metrics,
            elapsed,
        }
    }

    /// Appends a `DataPoint` to `history`, deriving `current_rps` from
    /// the delta against the previous entry (0 below the 100 ms floor
    /// or on the first snapshot).
    pub fn snapshot(&self) {
        let now = Utc::now();
        let elapsed = self.elapsed();
        let merged = self.overall.merged_bucket();
        let cumulative_total = merged.total();
        let quantiles = merged.snapshot(elapsed);

        let mut history = self.history.lock();
        let current_rps = match history.last() {
            Some(prev) => {
                let interval = elapsed.saturating_sub(prev.elapsed);
                if interval >= MIN_SNAPSHOT_INTERVAL && cumulative_total >= prev.cumulative_total {
                    (cumulative_total - prev.cumulative_total) as f64 / interval.as_secs_f64()
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        history.push(DataPoint {
            timestamp: now,
            elapsed,
            cumulative_total,
            cumulative_successes: quantiles.successes,
            cumulative_failures: quantiles.failures,
            current_rps,
            p50_latency_ms: quantiles.p50_latency_ms,
            p90_latency_ms: quantiles.p90_latency_ms,
            p95_latency_ms: quantiles.p95_latency_ms,
            p99_latency_ms: quantiles.p99_latency_ms,
        });
    }

    /// A defensive copy of the snapshot history.
    pub fn history(&self) -> Vec<DataPoint> {
        self.history.lock().clone()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

/// Final report for the whole run (spec.md §3 "Stats").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    #[serde(flatten)]
    pub total: EndpointStats,
    pub endpoints: HashMap<String, EndpointStats>,
    pub protocol_metrics: HashMap<String, HashMap<String, MetricValue>>,
    #[serde(skip)]
    pub elapsed: Duration,
}

// See `EndpointStats`'s `PartialEq` impl: `elapsed` is transient and
// excluded so a deserialized `Stats` compares equal to the original.
impl PartialEq for Stats {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total
            && self.endpoints == other.endpoints
            && self.protocol_metrics == other.protocol_metrics
    }
}

/// One time-series entry (spec.md §3 "DataPoint"). `current_rps` is
/// delta-based over the interval since the previous point; the
/// cumulative fields use elapsed-since-start, matching the §9 design
/// note splitting the two RPS meanings.
#[derive(Debug, Clone, Serialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub elapsed: Duration,
    pub cumulative_total: u64,
    pub cumulative_successes: u64,
    pub cumulative_failures: u64,
    pub current_rps: f64,
    pub p50_latency_ms: f64,
    pub p90_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample(endpoint: &str, ms: u64, err: Option<&str>) -> Sample {
        Sample {
            latency: Duration::from_millis(ms),
            error: err.map(|s| s.to_string()),
            endpoint: endpoint.to_string(),
            protocol: Protocol::Http,
            status_code: err.map(|_| "500".to_string()).unwrap_or_default(),
            custom_metrics: HashMap::new(),
        }
    }

    #[test]
    fn endpoint_created_lazily_and_once() {
        let collector = Collector::new();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            collector.record_request(&mut rng, &sample("A", 10, None));
        }
        let stats = collector.stats(Duration::from_secs(1));
        assert_eq!(stats.endpoints.len(), 1);
        assert_eq!(stats.endpoints["A"].total, 20);
        assert_eq!(stats.total.total, 20);
    }

    #[test]
    fn custom_metrics_accumulate_additively() {
        let collector = Collector::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut s = sample("", 1, None);
        s.custom_metrics.insert("bytes".to_string(), MetricValue::Int(100));
        collector.record_request(&mut rng, &s);
        collector.record_request(&mut rng, &s);
        let stats = collector.stats(Duration::from_secs(1));
        assert_eq!(
            stats.protocol_metrics["http"]["bytes"],
            MetricValue::Int(200)
        );
    }

    #[test]
    fn history_is_timestamp_increasing_and_copies_defensively() {
        let collector = Collector::new();
        collector.start();
        collector.snapshot();
        collector.snapshot();
        let h1 = collector.history();
        let h2 = collector.history();
        assert_eq!(h1.len(), 2);
        assert!(h1[1].timestamp >= h1[0].timestamp);
        assert_eq!(h1.len(), h2.len());
    }

    #[test]
    fn empty_endpoint_name_does_not_create_endpoint_entry() {
        let collector = Collector::new();
        let mut rng = StdRng::seed_from_u64(3);
        collector.record_request(&mut rng, &sample("", 5, None));
        let stats = collector.stats(Duration::from_secs(1));
        assert!(stats.endpoints.is_empty());
        assert_eq!(stats.total.total, 1);
    }

    #[test]
    fn stats_reports_duration_ms() {
        let collector = Collector::new();
        let mut rng = StdRng::seed_from_u64(4);
        collector.record_request(&mut rng, &sample("", 5, None));
        let stats = collector.stats(Duration::from_secs(2));
        assert_eq!(stats.total.duration_ms, 2000.0);
    }

    #[test]
    fn json_round_trip_preserves_stats() {
        let collector = Collector::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut s = sample("A", 10, None);
        s.custom_metrics.insert("bytes".to_string(), MetricValue::Int(42));
        collector.record_request(&mut rng, &s);
        collector.record_request(&mut rng, &sample("A", 20, Some("timeout")));
        let stats = collector.stats(Duration::from_secs(3));

        let encoded = serde_json::to_string(&stats).unwrap();
        let decoded: Stats = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, stats);
    }
}
