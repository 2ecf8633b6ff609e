//! `loadcore` — the scheduler ⇄ worker-pool ⇄ metrics-aggregator core of
//! a multi-protocol load-generation engine (spec.md §1).
//!
//! This crate drives a configurable population of concurrent workers
//! against a [`pool::RequestExecutor`] according to a time-varying
//! [`scheduler::RatePlan`], records outcomes into a striped HDR-histogram
//! aggregator ([`metrics::Collector`]), and reduces the final report to a
//! pass/fail decision via [`threshold::ThresholdEvaluator`].
//!
//! Protocol drivers, CLI parsing, feeder/HAR handling, and report
//! rendering are out of scope (spec.md §1) — callers supply a
//! [`pool::RequestExecutor`] and, optionally, a [`pool::RequestDataSource`],
//! and consume the [`metrics::Collector`]/[`metrics::Stats`]/
//! [`metrics::DataPoint`] types this crate produces.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod runner;
pub mod sample;
pub mod scheduler;
pub mod threshold;

#[cfg(any(test, feature = "test-util"))]
pub mod testsupport;

pub use config::{RawRunConfig, RunConfig, RunConfigBuilder};
pub use error::{LoadcoreError, Result};
pub use runner::{exit_code, RunOutcome, Runner, RunnerState, TerminationReason};
pub use sample::Sample;
pub use threshold::{Threshold, ThresholdEvaluator, ThresholdResult};
