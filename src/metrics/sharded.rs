use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use super::bucket::{Bucket, EndpointStats};

/// Shard count for `ShardedStats`. Fixed rather than configurable: spec.md
/// §4.3 calls this "large enough to keep per-shard contention negligible
/// at the worker-pool concurrencies this engine targets, small enough
/// that a full merge stays cheap."
const SHARD_COUNT: usize = 32;

/// Striped-lock aggregation: `SHARD_COUNT` independently-locked `Bucket`s,
/// one of which is picked at random per `record()` call, so that
/// concurrent workers rarely contend on the same lock (spec.md §4.3
/// "ShardedStats"). Grounded in the teacher's `PercentileSet`/collector
/// sharding in `metrics/collector.rs`, generalized from a fixed shard
/// key to random selection since callers have no natural partition key.
pub struct ShardedStats {
    shards: Vec<Mutex<Bucket>>,
}

impl ShardedStats {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(Bucket::new()));
        }
        Self { shards }
    }

    /// Records into a randomly-chosen shard. `rng` is caller-supplied so
    /// hot paths can reuse a thread-local generator instead of seeding a
    /// fresh one per call.
    pub fn record(&self, rng: &mut impl Rng, latency: Duration, error: Option<&str>, protocol: &str, status_code: &str) {
        let idx = rng.gen_range(0..self.shards.len());
        self.shards[idx].lock().record(latency, error, protocol, status_code);
    }

    /// Merges all shards into one `Bucket` and freezes it. Takes each
    /// shard lock in turn rather than holding all of them at once, so a
    /// concurrent `record()` only ever blocks on a single shard.
    pub fn snapshot(&self, elapsed: Duration) -> EndpointStats {
        self.merged_bucket().snapshot(elapsed)
    }

    /// Merges all shards into one `Bucket` without freezing it — used
    /// when the caller wants to merge several `ShardedStats` instances
    /// (e.g. per-endpoint into overall) before taking a single snapshot.
    pub fn merged_bucket(&self) -> Bucket {
        let mut merged = Bucket::new();
        for shard in &self.shards {
            merged.merge(&shard.lock());
        }
        merged
    }
}

impl Default for ShardedStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_records_all_land() {
        let stats = Arc::new(ShardedStats::new());
        let mut handles = Vec::new();
        for seed in 0..8u64 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..500 {
                    stats.record(&mut rng, Duration::from_micros(100), None, "", "");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot(Duration::from_secs(1));
        assert_eq!(snap.total, 4000);
        assert_eq!(snap.successes, 4000);
    }

    #[test]
    fn snapshot_reflects_mixed_outcomes() {
        let stats = ShardedStats::new();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            stats.record(&mut rng, Duration::from_millis(1), None, "", "");
        }
        for _ in 0..5 {
            stats.record(&mut rng, Duration::from_millis(2), Some("e"), "http", "500");
        }
        let snap = stats.snapshot(Duration::from_secs(1));
        assert_eq!(snap.total, 15);
        assert_eq!(snap.successes, 10);
        assert_eq!(snap.failures, 5);
        assert_eq!(
            snap.flattened_status_buckets(),
            vec![("http".to_string(), "500".to_string(), 5)]
        );
    }
}
