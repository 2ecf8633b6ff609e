use hdrhistogram::Histogram as HdrHistogram;

/// Lower bound of the tracked latency range, in microseconds.
pub const HIST_LOW_US: u64 = 1;
/// Upper bound of the tracked latency range, in microseconds (60 s).
pub const HIST_HIGH_US: u64 = 60_000_000;
/// Significant figures of precision retained by the HDR structure.
pub const HIST_SIGFIG: u8 = 3;

/// High-dynamic-range latency histogram over `[1 µs, 60 s]` at 3
/// significant figures (spec.md §4.1). A thin wrapper around
/// `hdrhistogram::Histogram` so the recording/merge/quantile contract is
/// explicit and independently testable, the same way `rust-redis-bench`
/// keeps its own `PercentileSet` extraction separate from the raw crate
/// type.
#[derive(Clone)]
pub struct LatencyHistogram {
    inner: HdrHistogram<u64>,
}

impl std::fmt::Debug for LatencyHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyHistogram")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            inner: HdrHistogram::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIG)
                .expect("histogram bounds are valid constants"),
        }
    }

    /// Records `us` microseconds, clamping into `[1, 60_000_000]`.
    pub fn record(&mut self, us: u64) {
        let clamped = us.clamp(HIST_LOW_US, HIST_HIGH_US);
        let _ = self.inner.record(clamped);
    }

    /// Elementwise merge. Both histograms share the same bounds by
    /// construction, so this never fails.
    pub fn merge(&mut self, other: &LatencyHistogram) {
        let _ = self.inner.add(&other.inner);
    }

    pub fn total_count(&self) -> u64 {
        self.inner.len()
    }

    pub fn min(&self) -> u64 {
        if self.inner.len() == 0 {
            0
        } else {
            self.inner.min()
        }
    }

    pub fn max(&self) -> u64 {
        if self.inner.len() == 0 {
            0
        } else {
            self.inner.max()
        }
    }

    pub fn mean(&self) -> f64 {
        if self.inner.len() == 0 {
            0.0
        } else {
            self.inner.mean()
        }
    }

    /// Smallest bucket upper bound whose cumulative count is at least
    /// `ceil(q/100 * totalCount)`; 0 when empty. `q` is a percent in
    /// `{50, 90, 95, 99}` (or any value in `(0, 100]`).
    pub fn value_at_quantile(&self, q: f64) -> u64 {
        if self.inner.len() == 0 {
            return 0;
        }
        self.inner.value_at_percentile(q)
    }

}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}
