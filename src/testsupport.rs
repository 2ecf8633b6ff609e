//! In-memory `RequestExecutor` / `RequestDataSource` implementations used
//! to drive the scheduler → pool → collector → threshold pipeline in
//! integration tests without a real protocol driver (spec.md §6 names
//! these traits as the engine's outbound/inbound boundary; the real
//! HTTP/WebSocket/SSE/gRPC implementations live outside this crate).
//!
//! Gated behind the `test-util` feature rather than `#[cfg(test)]` so
//! that integration tests under `tests/` — which compile against this
//! crate as an ordinary dependency — can reach it too, the same way
//! `tokio` ships its own `test-util` feature for `time::pause`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::pool::{DataSourceItem, DataSourceOutcome, ExecutionOutcome, RequestDataSource, RequestExecutor};
use crate::sample::Protocol;

/// Always returns the same outcome after sleeping a fixed latency.
pub struct FixedOutcomeExecutor {
    latency: Duration,
    outcome: ExecutionOutcome,
}

impl FixedOutcomeExecutor {
    pub fn success(latency: Duration) -> Self {
        Self {
            latency,
            outcome: ExecutionOutcome::success(Protocol::Http),
        }
    }

    pub fn failure(latency: Duration, status_code: impl Into<String>, retryable: bool) -> Self {
        Self {
            latency,
            outcome: ExecutionOutcome::failure(Protocol::Http, status_code, "scripted failure", retryable),
        }
    }
}

#[async_trait]
impl RequestExecutor for FixedOutcomeExecutor {
    async fn execute(&self, _endpoint: &Endpoint, _data: Option<&DataSourceItem>) -> ExecutionOutcome {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.outcome.clone()
    }
}

/// Fails every even-indexed call (retryable), succeeds every odd-indexed
/// call. Paired with `concurrency == 1` and `retries >= 1`, this models
/// "every logical request fails its first attempt, then succeeds on
/// retry" (spec.md §8 scenario 3): a single worker consumes permits
/// strictly in order, so call indices 0/1 are one logical request's two
/// attempts, 2/3 are the next request's, and so on.
pub struct AlternatingFailThenSucceedExecutor {
    calls: AtomicU32,
}

impl AlternatingFailThenSucceedExecutor {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for AlternatingFailThenSucceedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestExecutor for AlternatingFailThenSucceedExecutor {
    async fn execute(&self, _endpoint: &Endpoint, _data: Option<&DataSourceItem>) -> ExecutionOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 2 == 0 {
            ExecutionOutcome::failure(Protocol::Http, "503", "transient", true)
        } else {
            ExecutionOutcome::success(Protocol::Http)
        }
    }
}

/// Reports per-endpoint custom metrics alongside a fixed-latency success,
/// used to exercise `Collector`'s custom-metric aggregation end to end.
pub struct MeteredExecutor {
    latency: Duration,
}

impl MeteredExecutor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl RequestExecutor for MeteredExecutor {
    async fn execute(&self, _endpoint: &Endpoint, _data: Option<&DataSourceItem>) -> ExecutionOutcome {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut outcome = ExecutionOutcome::success(Protocol::Http);
        outcome
            .custom_metrics
            .insert("bytes_sent".to_string(), crate::sample::MetricValue::Int(128));
        outcome
    }
}

/// A finite or infinite round-robin in-memory [`RequestDataSource`]
/// (spec.md §6 "RequestDataSource").
pub struct InMemoryDataSource {
    records: Vec<HashMap<String, String>>,
    next_idx: AtomicU64,
    remaining: Option<AtomicU64>,
}

impl InMemoryDataSource {
    /// Cycles `records` forever.
    pub fn infinite(records: Vec<HashMap<String, String>>) -> Self {
        Self {
            records,
            next_idx: AtomicU64::new(0),
            remaining: None,
        }
    }

    /// Yields exactly `count` single-field records, then reports
    /// exhaustion forever after.
    pub fn finite(count: u64) -> Self {
        Self {
            records: vec![HashMap::new()],
            next_idx: AtomicU64::new(0),
            remaining: Some(AtomicU64::new(count)),
        }
    }
}

#[async_trait]
impl RequestDataSource for InMemoryDataSource {
    async fn next(&self) -> DataSourceOutcome {
        if let Some(remaining) = &self.remaining {
            loop {
                let current = remaining.load(Ordering::Acquire);
                if current == 0 {
                    return DataSourceOutcome::Exhausted;
                }
                if remaining
                    .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
            }
        }

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) as usize % self.records.len().max(1);
        DataSourceOutcome::Item(DataSourceItem {
            fields: self.records.get(idx).cloned().unwrap_or_default(),
        })
    }
}
