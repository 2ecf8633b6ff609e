//! Lifecycle owner: wires the scheduler, worker pool, and collector
//! together, starts the snapshotter, detects completion, and runs the
//! threshold evaluator (spec.md §4.7 "Runner").

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::config::RunConfig;
use crate::error::{LoadcoreError, Result};
use crate::metrics::{Collector, Stats};
use crate::pool::{RequestDataSource, RequestExecutor, WorkerPool};
use crate::scheduler::{recommended_channel_capacity, ArrivalScheduler};
use crate::threshold::{ThresholdEvaluator, ThresholdResult};

/// `Idle → Running → Stopping → Stopped` (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Which of the termination conditions in spec.md §4.7 actually fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    RequestCapReached,
    DurationElapsed,
    Cancelled,
    DataSourceExhausted,
}

/// What `Runner::run` returns: the final report, the threshold verdicts,
/// and why the run stopped.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: Stats,
    pub thresholds: Vec<ThresholdResult>,
    pub termination: TerminationReason,
}

/// Process exit code per spec.md §6: 0 if every threshold passed (or none
/// were defined) and the run was not cut short by data-source exhaustion;
/// 1 otherwise. Configuration errors (exit code 2) never reach this point
/// — they are rejected by [`crate::config::RunConfigBuilder::build`].
pub fn exit_code(outcome: &RunOutcome) -> i32 {
    if outcome.thresholds.iter().any(|t| !t.pass) {
        return 1;
    }
    if outcome.termination == TerminationReason::DataSourceExhausted {
        return 1;
    }
    0
}

/// Owns one run of the engine end to end. Grounded in the teacher's
/// `handlers::benchmark` start/stop/status trio — generalized from an
/// `AtomicBool` + `JoinHandle` pair guarded ad hoc in `AppState` into an
/// explicit state machine with its own lifecycle methods.
pub struct Runner {
    config: RunConfig,
    collector: Arc<Collector>,
    executor: Arc<dyn RequestExecutor>,
    data_source: Option<Arc<dyn RequestDataSource>>,
    state: Mutex<RunnerState>,
    cancel: Arc<AtomicBool>,
    external_stop_requested: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(
        config: RunConfig,
        executor: Arc<dyn RequestExecutor>,
        data_source: Option<Arc<dyn RequestDataSource>>,
    ) -> Self {
        Self {
            config,
            collector: Arc::new(Collector::new()),
            executor,
            data_source,
            state: Mutex::new(RunnerState::Idle),
            cancel: Arc::new(AtomicBool::new(false)),
            external_stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    /// The collector backing this run, so a caller can poll `history()`
    /// or a live `stats()` snapshot while `run()` is still in flight.
    pub fn collector(&self) -> Arc<Collector> {
        Arc::clone(&self.collector)
    }

    /// Requests early termination (e.g. on `SIGINT`). Safe to call
    /// concurrently with `run()`, any number of times, from any state.
    pub fn request_stop(&self) {
        self.external_stop_requested.store(true, Ordering::Release);
        self.cancel.store(true, Ordering::Release);
    }

    /// Runs the engine to completion: spawns the scheduler, worker pool,
    /// and a 1 Hz snapshot ticker; waits for whichever termination
    /// condition fires first; then computes final `Stats` and threshold
    /// results (spec.md §4.7).
    ///
    /// Returns [`LoadcoreError::NotIdle`] if the runner is not in the
    /// `Idle` state — each `Runner` instance runs exactly once.
    pub async fn run(&self) -> Result<RunOutcome> {
        {
            let mut state = self.state.lock();
            if *state != RunnerState::Idle {
                return Err(LoadcoreError::NotIdle(*state));
            }
            *state = RunnerState::Running;
        }

        self.collector.start();
        info!(concurrency = self.config.concurrency, "run started");

        let capacity = recommended_channel_capacity(self.config.concurrency);
        let (tx, rx) = mpsc::channel(capacity);

        let fired = Arc::new(AtomicU64::new(0));
        let exhausted = Arc::new(AtomicBool::new(false));

        let scheduler = ArrivalScheduler::new(
            self.config.rate_plan.clone(),
            self.config.arrival_model,
            self.config.endpoints.clone(),
            self.config.total_cap,
            self.config.duration_cap,
            self.config.seed,
        );
        let scheduler_handle = tokio::spawn(scheduler.run(tx, Arc::clone(&self.cancel), Arc::clone(&fired)));

        let pool = WorkerPool::new(
            self.config.concurrency,
            Arc::clone(&self.executor),
            self.data_source.clone(),
            self.config.per_request_timeout,
            self.config.retries,
        );
        let pool_handle = tokio::spawn(pool.run(
            rx,
            Arc::clone(&self.collector),
            Arc::clone(&self.cancel),
            Arc::clone(&exhausted),
        ));

        let ticker_handle = self.spawn_snapshot_ticker();
        let exhaustion_watch_handle = self.spawn_exhaustion_watch(Arc::clone(&exhausted));

        // Scheduler exits first (cap/duration/cancel); the pool follows
        // once the permit channel closes, or sooner if cancelled.
        let _sent = scheduler_handle.await.unwrap_or(0);
        let _ = pool_handle.await;

        // Stop the ticker and the exhaustion watcher now that the run's
        // own work is done, whether or not the root signal already fired.
        self.cancel.store(true, Ordering::Release);
        let _ = ticker_handle.await;
        let _ = exhaustion_watch_handle.await;

        {
            let mut state = self.state.lock();
            *state = RunnerState::Stopping;
        }

        let elapsed = self.collector.elapsed();
        let stats = self.collector.stats(elapsed);
        let thresholds = ThresholdEvaluator::evaluate(&self.config.thresholds, &stats);

        let termination = if exhausted.load(Ordering::Acquire) {
            TerminationReason::DataSourceExhausted
        } else if self.external_stop_requested.load(Ordering::Acquire) {
            TerminationReason::Cancelled
        } else if self.config.duration_cap != Duration::ZERO && elapsed >= self.config.duration_cap {
            TerminationReason::DurationElapsed
        } else {
            TerminationReason::RequestCapReached
        };

        {
            let mut state = self.state.lock();
            *state = RunnerState::Stopped;
        }
        info!(?termination, total = stats.total.total, "run finished");

        Ok(RunOutcome {
            stats,
            thresholds,
            termination,
        })
    }

    /// 1 Hz snapshot ticker (spec.md §4.7 "starts a snapshot ticker at
    /// 1 Hz"). Stops as soon as the root cancellation signal fires.
    fn spawn_snapshot_ticker(&self) -> tokio::task::JoinHandle<()> {
        let collector = Arc::clone(&self.collector);
        let cancel = Arc::clone(&self.cancel);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if cancel.load(Ordering::Acquire) {
                    break;
                }
                collector.snapshot();
            }
        })
    }

    /// Polls `exhausted` and trips the root cancellation signal the
    /// moment the data source runs dry, so every task (scheduler, the
    /// rest of the worker pool, the ticker) stops promptly rather than
    /// only the one worker that discovered the exhaustion (spec.md §4.6
    /// "Data-source exhaustion").
    fn spawn_exhaustion_watch(&self, exhausted: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
        let cancel = Arc::clone(&self.cancel);
        tokio::spawn(async move {
            loop {
                if exhausted.load(Ordering::Acquire) {
                    cancel.store(true, Ordering::Release);
                    break;
                }
                if cancel.load(Ordering::Acquire) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfigBuilder;
    use crate::scheduler::ArrivalModel;
    use crate::testsupport::{FixedOutcomeExecutor, InMemoryDataSource};
    use std::time::Duration as StdDuration;

    #[tokio::test(start_paused = true)]
    async fn rerunning_an_already_run_runner_errors() {
        let config = RunConfigBuilder::new()
            .concurrency(1)
            .total_requests(1)
            .build()
            .unwrap();
        let executor = Arc::new(FixedOutcomeExecutor::success(StdDuration::from_millis(1)));
        let runner = Runner::new(config, executor, None);

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.stats.total.total, 1);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, LoadcoreError::NotIdle(RunnerState::Stopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn data_source_exhaustion_stops_the_run_early() {
        let config = RunConfigBuilder::new()
            .concurrency(2)
            .total_requests(1000)
            .arrival_model(ArrivalModel::Uniform)
            .build()
            .unwrap();
        let executor = Arc::new(FixedOutcomeExecutor::success(StdDuration::from_millis(1)));
        let data_source = Arc::new(InMemoryDataSource::finite(5));
        let runner = Runner::new(config, executor, Some(data_source));

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.termination, TerminationReason::DataSourceExhausted);
        assert!(outcome.stats.total.total <= 7);
    }
}
