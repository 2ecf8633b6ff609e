use std::time::Duration;

/// One segment of a rate plan (spec.md §3 "RatePlan").
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Linearly interpolates from `from_rps` to `to_rps` over `duration`.
    Ramp {
        from_rps: f64,
        to_rps: f64,
        duration: Duration,
    },
    /// Holds each `(rps, duration)` pair in sequence.
    Step(Vec<(f64, Duration)>),
    /// Holds a single rate for `duration`.
    Spike { rps: f64, duration: Duration },
}

impl Phase {
    fn total_duration(&self) -> Duration {
        match self {
            Phase::Ramp { duration, .. } => *duration,
            Phase::Step(steps) => steps.iter().map(|(_, d)| *d).sum(),
            Phase::Spike { duration, .. } => *duration,
        }
    }

    /// Rate at `offset` into this phase. Caller guarantees
    /// `offset <= total_duration()`.
    fn rate_at(&self, offset: Duration) -> f64 {
        match self {
            Phase::Ramp {
                from_rps,
                to_rps,
                duration,
            } => {
                if duration.is_zero() {
                    return *to_rps;
                }
                let t = offset.as_secs_f64() / duration.as_secs_f64();
                from_rps + (to_rps - from_rps) * t.clamp(0.0, 1.0)
            }
            Phase::Step(steps) => {
                let mut acc = Duration::ZERO;
                for (rps, d) in steps {
                    acc += *d;
                    if offset < acc {
                        return *rps;
                    }
                }
                steps.last().map(|(rps, _)| *rps).unwrap_or(0.0)
            }
            Phase::Spike { rps, .. } => *rps,
        }
    }

    /// The rate this phase trails off at, used once elapsed time runs
    /// past the entire plan.
    fn trailing_rate(&self) -> f64 {
        match self {
            Phase::Ramp { to_rps, .. } => *to_rps,
            Phase::Step(steps) => steps.last().map(|(rps, _)| *rps).unwrap_or(0.0),
            Phase::Spike { rps, .. } => *rps,
        }
    }
}

/// Piecewise target-RPS function over elapsed run time (spec.md §3
/// "RatePlan", §4.5 algorithm step 1). An empty plan means a single
/// phase of constant rate `R` for the whole run (`R == 0` ⇒ unthrottled).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RatePlan {
    phases: Vec<Phase>,
}

impl RatePlan {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// A single constant-rate phase for the whole run. `rps == 0` means
    /// unthrottled (the scheduler fires as fast as a permit is consumed).
    pub fn constant(rps: f64) -> Self {
        Self {
            phases: vec![Phase::Step(vec![(rps, Duration::MAX)])],
        }
    }

    /// Target RPS at elapsed time `t`. After the last phase ends, holds
    /// the trailing rate (or 0 if the plan is empty) until the caller's
    /// own duration cap elapses.
    pub fn rate_at(&self, t: Duration) -> f64 {
        if self.phases.is_empty() {
            return 0.0;
        }

        let mut acc = Duration::ZERO;
        for phase in &self.phases {
            let phase_dur = phase.total_duration();
            let phase_end = acc.saturating_add(phase_dur);
            if t < phase_end || phase_dur == Duration::MAX {
                return phase.rate_at(t.saturating_sub(acc));
            }
            acc = phase_end;
        }

        self.phases
            .last()
            .map(|p| p.trailing_rate())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_plan_holds_rate() {
        let plan = RatePlan::constant(50.0);
        assert_eq!(plan.rate_at(Duration::ZERO), 50.0);
        assert_eq!(plan.rate_at(Duration::from_secs(1000)), 50.0);
    }

    #[test]
    fn ramp_interpolates_linearly() {
        let plan = RatePlan::new(vec![Phase::Ramp {
            from_rps: 10.0,
            to_rps: 100.0,
            duration: Duration::from_secs(10),
        }]);
        assert_eq!(plan.rate_at(Duration::ZERO), 10.0);
        assert_eq!(plan.rate_at(Duration::from_secs(5)), 55.0);
        assert_eq!(plan.rate_at(Duration::from_secs(10)), 100.0);
    }

    #[test]
    fn ramp_trails_off_at_final_rate_past_plan_end() {
        let plan = RatePlan::new(vec![Phase::Ramp {
            from_rps: 10.0,
            to_rps: 100.0,
            duration: Duration::from_secs(10),
        }]);
        assert_eq!(plan.rate_at(Duration::from_secs(20)), 100.0);
    }

    #[test]
    fn step_holds_each_segment_then_plays_sequence() {
        let plan = RatePlan::new(vec![Phase::Step(vec![
            (10.0, Duration::from_secs(2)),
            (20.0, Duration::from_secs(2)),
        ])]);
        assert_eq!(plan.rate_at(Duration::from_millis(500)), 10.0);
        assert_eq!(plan.rate_at(Duration::from_millis(2500)), 20.0);
        assert_eq!(plan.rate_at(Duration::from_secs(10)), 20.0);
    }

    #[test]
    fn spike_is_constant_for_its_duration() {
        let plan = RatePlan::new(vec![Phase::Spike {
            rps: 500.0,
            duration: Duration::from_secs(1),
        }]);
        assert_eq!(plan.rate_at(Duration::ZERO), 500.0);
        assert_eq!(plan.rate_at(Duration::from_millis(999)), 500.0);
        assert_eq!(plan.rate_at(Duration::from_secs(5)), 500.0);
    }

    #[test]
    fn multi_phase_plan_plays_phases_in_sequence() {
        let plan = RatePlan::new(vec![
            Phase::Spike {
                rps: 500.0,
                duration: Duration::from_secs(1),
            },
            Phase::Ramp {
                from_rps: 0.0,
                to_rps: 10.0,
                duration: Duration::from_secs(2),
            },
        ]);
        assert_eq!(plan.rate_at(Duration::from_millis(500)), 500.0);
        assert_eq!(plan.rate_at(Duration::from_millis(1500)), 5.0);
        assert_eq!(plan.rate_at(Duration::from_secs(10)), 10.0);
    }

    #[test]
    fn empty_plan_is_zero_rate() {
        let plan = RatePlan::new(vec![]);
        assert_eq!(plan.rate_at(Duration::ZERO), 0.0);
    }
}
