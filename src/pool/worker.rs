use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tracing::warn;

use super::executor::{DataSourceItem, DataSourceOutcome, ExecutionOutcome, RequestDataSource, RequestExecutor};
use crate::metrics::Collector;
use crate::sample::Sample;
use crate::scheduler::FirePermit;

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(2);

/// A fixed-size pool of cooperating workers pulling fire-permits from a
/// shared channel and invoking a [`RequestExecutor`] (spec.md §4.6
/// "WorkerPool"). Grounded in the teacher's `load_generator::worker`
/// loop (per-worker seeded `StdRng`, `Arc<AtomicBool>` cancellation,
/// `Instant`-measured latency), generalized from a fixed Redis
/// read/write split to an arbitrary executor/timeout/retry policy.
pub struct WorkerPool {
    concurrency: usize,
    executor: Arc<dyn RequestExecutor>,
    data_source: Option<Arc<dyn RequestDataSource>>,
    per_request_timeout: Option<Duration>,
    retries: u32,
}

impl WorkerPool {
    pub fn new(
        concurrency: usize,
        executor: Arc<dyn RequestExecutor>,
        data_source: Option<Arc<dyn RequestDataSource>>,
        per_request_timeout: Option<Duration>,
        retries: u32,
    ) -> Self {
        Self {
            concurrency: concurrency.max(1),
            executor,
            data_source,
            per_request_timeout,
            retries,
        }
    }

    /// Spawns `concurrency` worker tasks sharing `permit_rx`. Returns
    /// once every worker has exited — on permit-channel closure,
    /// cancellation, or data-source exhaustion.
    pub async fn run(
        self,
        permit_rx: mpsc::Receiver<FirePermit>,
        collector: Arc<Collector>,
        cancel: Arc<AtomicBool>,
        exhausted: Arc<AtomicBool>,
    ) {
        let permit_rx = Arc::new(AsyncMutex::new(permit_rx));
        let mut handles = Vec::with_capacity(self.concurrency);

        for worker_id in 0..self.concurrency {
            let permit_rx = Arc::clone(&permit_rx);
            let collector = Arc::clone(&collector);
            let cancel = Arc::clone(&cancel);
            let exhausted = Arc::clone(&exhausted);
            let executor = Arc::clone(&self.executor);
            let data_source = self.data_source.clone();
            let timeout = self.per_request_timeout;
            let retries = self.retries;

            handles.push(tokio::spawn(async move {
                worker_loop(
                    worker_id,
                    permit_rx,
                    executor,
                    data_source,
                    timeout,
                    retries,
                    collector,
                    cancel,
                    exhausted,
                )
                .await;
            }));
        }

        for h in handles {
            let _ = h.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    permit_rx: Arc<AsyncMutex<mpsc::Receiver<FirePermit>>>,
    executor: Arc<dyn RequestExecutor>,
    data_source: Option<Arc<dyn RequestDataSource>>,
    timeout: Option<Duration>,
    retries: u32,
    collector: Arc<Collector>,
    cancel: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
) {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE + worker_id as u64);

    loop {
        if cancel.load(Ordering::Acquire) {
            break;
        }

        let permit = {
            let mut rx = permit_rx.lock().await;
            rx.recv().await
        };
        let Some(permit) = permit else {
            break;
        };

        let data = match &data_source {
            Some(source) => match source.next().await {
                DataSourceOutcome::Item(item) => Some(item),
                DataSourceOutcome::Exhausted => {
                    exhausted.store(true, Ordering::Release);
                    break;
                }
            },
            None => None,
        };

        let sample = run_with_retries(
            &executor,
            &permit,
            data.as_ref(),
            timeout,
            retries,
            &cancel,
            &mut rng,
        )
        .await;

        collector.record_request(&mut rng, &sample);
    }
}

/// Runs one logical request to completion, retrying per spec.md §4.6:
/// "a retried request counts as one request in metrics, reporting the
/// last attempt's latency and outcome."
async fn run_with_retries(
    executor: &Arc<dyn RequestExecutor>,
    permit: &FirePermit,
    data: Option<&DataSourceItem>,
    timeout: Option<Duration>,
    retries: u32,
    cancel: &Arc<AtomicBool>,
    rng: &mut StdRng,
) -> Sample {
    let mut attempt = 0u32;
    loop {
        let (latency, outcome) = execute_once(executor, permit, data, timeout).await;

        let retryable = outcome_is_retryable(&outcome);
        if !retryable || attempt >= retries || cancel.load(Ordering::Acquire) {
            return sample_from_outcome(permit, latency, outcome);
        }

        let delay = full_jitter_backoff(attempt, rng);
        attempt += 1;
        warn!(attempt, ?delay, endpoint = %permit.endpoint.name, "retrying request");
        tokio::time::sleep(delay).await;
    }
}

async fn execute_once(
    executor: &Arc<dyn RequestExecutor>,
    permit: &FirePermit,
    data: Option<&DataSourceItem>,
    timeout: Option<Duration>,
) -> (Duration, ExecutionOutcome) {
    let start = Instant::now();
    let outcome = match timeout {
        Some(t) => match tokio::time::timeout(t, executor.execute(&permit.endpoint, data)).await {
            Ok(outcome) => outcome,
            Err(_) => ExecutionOutcome::failure(
                crate::sample::Protocol::Unspecified,
                "TIMEOUT",
                "request exceeded per-request timeout",
                true,
            ),
        },
        None => executor.execute(&permit.endpoint, data).await,
    };
    (start.elapsed(), outcome)
}

fn outcome_is_retryable(outcome: &ExecutionOutcome) -> bool {
    outcome.error.is_some() && outcome.retryable
}

fn sample_from_outcome(permit: &FirePermit, latency: Duration, outcome: ExecutionOutcome) -> Sample {
    Sample {
        latency,
        error: outcome.error,
        endpoint: permit.endpoint.name.clone(),
        protocol: outcome.protocol,
        status_code: outcome.status_code,
        custom_metrics: outcome.custom_metrics,
    }
}

/// `min(cap, base * 2^attempt) * U(0, 1)` (spec.md §4.6 "Backoff").
fn full_jitter_backoff(attempt: u32, rng: &mut StdRng) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(BACKOFF_CAP);
    let jitter: f64 = rng.gen();
    Duration::from_secs_f64(capped.as_secs_f64() * jitter)
}
