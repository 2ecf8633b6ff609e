use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tracing::debug;

use crate::endpoint::{Endpoint, WeightedPicker};

/// Selects inter-arrival gaps from the target rate (spec.md §4.5 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalModel {
    Uniform,
    Poisson,
}

/// A token carrying the chosen endpoint and the time it was meant to
/// fire, emitted by [`ArrivalScheduler`] and consumed by the worker pool
/// (spec.md §GLOSSARY "Fire-permit").
#[derive(Debug, Clone)]
pub struct FirePermit {
    pub endpoint: Endpoint,
    pub nominal_fire_time: Instant,
}

/// Recommended bounded capacity for the permit channel (spec.md §5
/// "Back-pressure discipline": "recommended capacity: C").
pub fn recommended_channel_capacity(worker_count: usize) -> usize {
    worker_count.max(1)
}

/// Produces a monotonic sequence of fire-permits honoring a [`RatePlan`](
/// super::rate_plan::RatePlan) and [`ArrivalModel`], bounded by an
/// optional total-request cap and an optional run-duration cap
/// (spec.md §4.5 "ArrivalScheduler").
pub struct ArrivalScheduler {
    rate_plan: crate::scheduler::rate_plan::RatePlan,
    model: ArrivalModel,
    picker: WeightedPicker,
    total_cap: u64,
    duration_cap: Duration,
    seed: u64,
}

impl ArrivalScheduler {
    pub fn new(
        rate_plan: crate::scheduler::rate_plan::RatePlan,
        model: ArrivalModel,
        endpoints: Vec<Endpoint>,
        total_cap: u64,
        duration_cap: Duration,
        seed: u64,
    ) -> Self {
        Self {
            rate_plan,
            model,
            picker: WeightedPicker::new(endpoints),
            total_cap,
            duration_cap,
            seed,
        }
    }

    /// Runs the scheduler loop until cancelled, the total cap is
    /// reached, or the duration cap elapses; drops (closes) `tx` on
    /// exit. Returns the number of permits actually sent.
    pub async fn run(
        self,
        tx: mpsc::Sender<FirePermit>,
        cancel: Arc<AtomicBool>,
        fired: Arc<AtomicU64>,
    ) -> u64 {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let start = Instant::now();
        let mut sent: u64 = 0;
        // Nominal cumulative offset from `start`, advanced by each
        // computed gap rather than by wall-clock reads — this is what
        // keeps the fire schedule from drifting under load (spec.md §9
        // "Clocks": absolute-time scheduling, not relative sleeps).
        let mut scheduled: Duration = Duration::ZERO;

        loop {
            if cancel.load(Ordering::Acquire) {
                debug!("arrival scheduler observed cancellation");
                break;
            }
            if self.total_cap != 0 && sent >= self.total_cap {
                break;
            }
            // Wall-clock, not `scheduled`: for an unthrottled run
            // (`rate == 0`) `next_gap` always returns zero, so the
            // nominal offset never advances and a cap keyed off it
            // would never fire (spec.md §4.5 "R = 0 ⇒ unthrottled ...
            // for the configured duration").
            if self.duration_cap != Duration::ZERO && start.elapsed() >= self.duration_cap {
                break;
            }

            let rate = self.rate_plan.rate_at(scheduled);
            let gap = self.next_gap(&mut rng, rate);
            scheduled += gap;

            let fire_at = start + scheduled;
            if gap > Duration::ZERO {
                tokio::select! {
                    _ = sleep_until(fire_at.into()) => {}
                    _ = wait_for_cancel(&cancel) => {
                        break;
                    }
                }
            }
            if cancel.load(Ordering::Acquire) {
                break;
            }

            let endpoint = self.picker.pick(&mut rng).clone();
            let permit = FirePermit {
                endpoint,
                nominal_fire_time: fire_at,
            };

            tokio::select! {
                res = tx.send(permit) => {
                    if res.is_err() {
                        break;
                    }
                }
                _ = wait_for_cancel(&cancel) => {
                    break;
                }
            }

            sent += 1;
            fired.store(sent, Ordering::Release);
        }

        sent
    }

    /// `Δ` per spec.md §4.5 step 2. `rate == 0` means "send as fast as a
    /// worker is available" — no scheduler throttle (gap of zero).
    fn next_gap(&self, rng: &mut StdRng, rate: f64) -> Duration {
        if rate <= 0.0 {
            return Duration::ZERO;
        }
        let secs = match self.model {
            ArrivalModel::Uniform => 1.0 / rate,
            ArrivalModel::Poisson => {
                let mut u: f64 = rng.gen();
                while u == 0.0 {
                    u = rng.gen();
                }
                -u.ln() / rate
            }
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Polls the cancellation flag so the scheduler's `select!` arms never
/// block indefinitely on a cancelled run (spec.md §5 "every blocking
/// operation selects on cancel").
async fn wait_for_cancel(cancel: &Arc<AtomicBool>) {
    loop {
        if cancel.load(Ordering::Acquire) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
