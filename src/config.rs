//! Run configuration: the validated, immutable input to a [`crate::runner::Runner`].
//!
//! Mirrors the teacher's `BenchmarkConfig` shape — a `serde`-deserializable
//! struct with `#[serde(default = "...")]` free functions for every
//! primitive field — generalized from `{concurrency, duration_secs,
//! read_pct}` to the full rate-plan/threshold/retry surface, and widened
//! from the teacher's inline handler validation into an explicit
//! `RunConfigBuilder::build()` that rejects bad input before any task is
//! spawned (spec.md §7 "Configuration errors ... fatal at setup").

use std::time::Duration;

use serde::Deserialize;

use crate::endpoint::Endpoint;
use crate::error::{LoadcoreError, Result};
use crate::scheduler::{ArrivalModel, RatePlan};
use crate::threshold::{Threshold, ThresholdEvaluator};

fn default_concurrency() -> u32 {
    10
}
fn default_retries() -> u32 {
    0
}
fn default_seed() -> u64 {
    0
}

/// Deserializable, unvalidated run configuration. Use [`RunConfigBuilder`]
/// or [`RunConfig::from_raw`] to turn this into a validated [`RunConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawRunConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    #[serde(default)]
    pub rate_plan: Option<RatePlan>,
    /// Used only when `rate_plan` is absent: a single constant-rate phase
    /// for the whole run (`0` ⇒ unthrottled), per spec.md §4.5.
    #[serde(default)]
    pub constant_rps: f64,

    #[serde(default = "default_arrival_model")]
    pub arrival_model: ArrivalModel,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// `N_total`; 0 ⇒ unbounded.
    #[serde(default)]
    pub total_requests: u64,

    /// `D` in seconds; 0 ⇒ unbounded.
    #[serde(default)]
    pub duration_secs: u64,

    /// Per-request timeout in milliseconds; 0 ⇒ no timeout.
    #[serde(default)]
    pub timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default)]
    pub thresholds: Vec<String>,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_arrival_model() -> ArrivalModel {
    ArrivalModel::Uniform
}

impl Default for RawRunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_plan: None,
            constant_rps: 0.0,
            arrival_model: default_arrival_model(),
            endpoints: Vec::new(),
            total_requests: 0,
            duration_secs: 0,
            timeout_ms: 0,
            retries: default_retries(),
            thresholds: Vec::new(),
            seed: default_seed(),
        }
    }
}

/// Validated, ready-to-run configuration. The only way to obtain one is
/// through [`RunConfigBuilder::build`], which performs every setup-time
/// check the spec requires (bad rate plan, bad threshold grammar) and
/// returns a [`LoadcoreError`] instead of letting bad input reach the
/// runner.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub concurrency: usize,
    pub rate_plan: RatePlan,
    pub arrival_model: ArrivalModel,
    pub endpoints: Vec<Endpoint>,
    pub total_cap: u64,
    pub duration_cap: Duration,
    pub per_request_timeout: Option<Duration>,
    pub retries: u32,
    pub thresholds: Vec<Threshold>,
    pub seed: u64,
}

/// Fluent builder mirroring the teacher's "reject at the door" guard
/// clauses (`handlers::benchmark::start_benchmark`), generalized to the
/// full engine surface.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    raw: RawRunConfig,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawRunConfig::default(),
        }
    }

    pub fn from_raw(raw: RawRunConfig) -> Self {
        Self { raw }
    }

    pub fn concurrency(mut self, c: u32) -> Self {
        self.raw.concurrency = c;
        self
    }

    pub fn rate_plan(mut self, plan: RatePlan) -> Self {
        self.raw.rate_plan = Some(plan);
        self
    }

    pub fn constant_rps(mut self, rps: f64) -> Self {
        self.raw.constant_rps = rps;
        self
    }

    pub fn arrival_model(mut self, model: ArrivalModel) -> Self {
        self.raw.arrival_model = model;
        self
    }

    pub fn endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.raw.endpoints = endpoints;
        self
    }

    pub fn total_requests(mut self, n: u64) -> Self {
        self.raw.total_requests = n;
        self
    }

    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.raw.duration_secs = secs;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.raw.timeout_ms = ms;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.raw.retries = retries;
        self
    }

    pub fn threshold(mut self, predicate: impl Into<String>) -> Self {
        self.raw.thresholds.push(predicate.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.raw.seed = seed;
        self
    }

    /// Validates and finalizes the configuration. Every failure here is a
    /// setup-time [`LoadcoreError`] — nothing partially-valid reaches the
    /// runner.
    pub fn build(self) -> Result<RunConfig> {
        let raw = self.raw;

        if raw.concurrency == 0 {
            return Err(LoadcoreError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if raw.constant_rps < 0.0 {
            return Err(LoadcoreError::InvalidConfig(
                "constant_rps must not be negative".to_string(),
            ));
        }
        for endpoint in &raw.endpoints {
            if endpoint.name.is_empty() {
                return Err(LoadcoreError::InvalidConfig(
                    "declared endpoints must have a non-empty name".to_string(),
                ));
            }
        }

        let rate_plan = raw.rate_plan.unwrap_or_else(|| RatePlan::constant(raw.constant_rps));
        let thresholds = ThresholdEvaluator::parse_all(&raw.thresholds)?;

        Ok(RunConfig {
            concurrency: raw.concurrency as usize,
            rate_plan,
            arrival_model: raw.arrival_model,
            endpoints: raw.endpoints,
            total_cap: raw.total_requests,
            duration_cap: Duration::from_secs(raw.duration_secs),
            per_request_timeout: if raw.timeout_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(raw.timeout_ms))
            },
            retries: raw.retries,
            thresholds,
            seed: raw.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = RunConfigBuilder::new().concurrency(0).build().unwrap_err();
        assert!(matches!(err, LoadcoreError::InvalidConfig(_)));
    }

    #[test]
    fn bad_threshold_is_rejected_at_build_time() {
        let err = RunConfigBuilder::new()
            .threshold("not_a_metric:whatever < 1")
            .build()
            .unwrap_err();
        assert!(matches!(err, LoadcoreError::InvalidThreshold { .. }));
    }

    #[test]
    fn empty_endpoint_name_is_rejected() {
        let err = RunConfigBuilder::new()
            .endpoints(vec![Endpoint::new("", 1)])
            .build()
            .unwrap_err();
        assert!(matches!(err, LoadcoreError::InvalidConfig(_)));
    }

    #[test]
    fn defaults_produce_an_unthrottled_single_worker_config() {
        let config = RunConfigBuilder::new().build().unwrap();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.total_cap, 0);
        assert_eq!(config.duration_cap, Duration::ZERO);
        assert!(config.per_request_timeout.is_none());
        assert_eq!(config.rate_plan.rate_at(Duration::ZERO), 0.0);
    }
}
