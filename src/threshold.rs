//! Threshold grammar parsing and evaluation (spec.md §4.8).
//!
//! A threshold predicate has the shape `metric:aggregate operator number`,
//! e.g. `http_req_duration:p99 < 300`. Parsing failures, unknown
//! metrics/aggregates/operators, or non-numeric values reject the whole
//! list at setup — they never reach the runner (spec.md §7 "Configuration
//! errors ... fatal at setup").

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{LoadcoreError, Result};
use crate::metrics::Stats;

/// Equality comparisons use this epsilon (spec.md §4.8).
const EQ_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    HttpReqDuration,
    HttpReqFailed,
    HttpRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    P50,
    P90,
    P95,
    P99,
    Avg,
    Min,
    Max,
    Rate,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl Operator {
    fn apply(self, actual: f64, target: f64) -> bool {
        match self {
            Operator::Lt => actual < target,
            Operator::Lte => actual <= target,
            Operator::Gt => actual > target,
            Operator::Gte => actual >= target,
            Operator::Eq => (actual - target).abs() < EQ_EPSILON,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Eq => "==",
        }
    }
}

/// One parsed threshold predicate, ready to evaluate against a final
/// [`Stats`].
#[derive(Debug, Clone)]
pub struct Threshold {
    raw: String,
    metric: Metric,
    aggregate: Aggregate,
    operator: Operator,
    target: f64,
}

/// The verdict for one threshold against a completed run (spec.md §4.8
/// "Final result is a list of `{threshold, actualValue, pass, message}`").
#[derive(Debug, Clone, serde::Serialize)]
pub struct ThresholdResult {
    pub threshold: String,
    pub actual_value: f64,
    pub pass: bool,
    pub message: String,
}

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^\s*
            (?P<metric>[A-Za-z_]+)
            :
            (?P<aggregate>[A-Za-z_]+)
            \s*
            (?P<op><=|>=|==|<|>)
            \s*
            (?P<value>-?[0-9]+(?:\.[0-9]+)?)
            \s*$
            ",
        )
        .expect("threshold grammar regex is a valid static pattern")
    })
}

/// Stateless parser/evaluator for threshold predicates.
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    /// Parses one raw predicate string.
    pub fn parse(raw: &str) -> Result<Threshold> {
        let caps = grammar().captures(raw).ok_or_else(|| LoadcoreError::InvalidThreshold {
            raw: raw.to_string(),
            reason: "does not match `metric:aggregate operator number`".to_string(),
        })?;

        let metric_str = &caps["metric"];
        let metric = match metric_str {
            "http_req_duration" => Metric::HttpReqDuration,
            "http_req_failed" => Metric::HttpReqFailed,
            "http_requests" => Metric::HttpRequests,
            other => {
                return Err(LoadcoreError::InvalidThreshold {
                    raw: raw.to_string(),
                    reason: format!("unknown metric {other:?}"),
                })
            }
        };

        let aggregate_str = &caps["aggregate"];
        let aggregate = match (metric, aggregate_str) {
            (Metric::HttpReqDuration, "p50") => Aggregate::P50,
            (Metric::HttpReqDuration, "p90") => Aggregate::P90,
            (Metric::HttpReqDuration, "p95") => Aggregate::P95,
            (Metric::HttpReqDuration, "p99") => Aggregate::P99,
            (Metric::HttpReqDuration, "avg") | (Metric::HttpReqDuration, "mean") => Aggregate::Avg,
            (Metric::HttpReqDuration, "min") => Aggregate::Min,
            (Metric::HttpReqDuration, "max") => Aggregate::Max,
            (Metric::HttpReqFailed, "rate") | (Metric::HttpRequests, "rate") => Aggregate::Rate,
            (Metric::HttpReqFailed, "count") | (Metric::HttpRequests, "count") => Aggregate::Count,
            (_, other) => {
                return Err(LoadcoreError::InvalidThreshold {
                    raw: raw.to_string(),
                    reason: format!("aggregate {other:?} is not valid for metric {metric_str:?}"),
                })
            }
        };

        let operator = match &caps["op"] {
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "==" => Operator::Eq,
            other => {
                return Err(LoadcoreError::InvalidThreshold {
                    raw: raw.to_string(),
                    reason: format!("unknown operator {other:?}"),
                })
            }
        };

        let target: f64 = caps["value"].parse().map_err(|_| LoadcoreError::InvalidThreshold {
            raw: raw.to_string(),
            reason: "target value is not numeric".to_string(),
        })?;

        Ok(Threshold {
            raw: raw.to_string(),
            metric,
            aggregate,
            operator,
            target,
        })
    }

    /// Parses every predicate in `raws`, rejecting the entire list if any
    /// one fails (spec.md §4.8).
    pub fn parse_all(raws: &[String]) -> Result<Vec<Threshold>> {
        raws.iter().map(|raw| Self::parse(raw)).collect()
    }

    /// Extracts the metric's actual value from `stats`'s overall total.
    fn extract(threshold: &Threshold, stats: &Stats) -> f64 {
        let total = &stats.total;
        match (threshold.metric, threshold.aggregate) {
            (Metric::HttpReqDuration, Aggregate::P50) => total.p50_latency_ms,
            (Metric::HttpReqDuration, Aggregate::P90) => total.p90_latency_ms,
            (Metric::HttpReqDuration, Aggregate::P95) => total.p95_latency_ms,
            (Metric::HttpReqDuration, Aggregate::P99) => total.p99_latency_ms,
            (Metric::HttpReqDuration, Aggregate::Avg) => total.mean_latency_ms,
            (Metric::HttpReqDuration, Aggregate::Min) => total.min_latency_ms,
            (Metric::HttpReqDuration, Aggregate::Max) => total.max_latency_ms,
            (Metric::HttpReqFailed, Aggregate::Rate) => total.failure_rate(),
            (Metric::HttpReqFailed, Aggregate::Count) => total.failures as f64,
            (Metric::HttpRequests, Aggregate::Rate) => total.requests_per_sec,
            (Metric::HttpRequests, Aggregate::Count) => total.total as f64,
            _ => unreachable!("parse() rejects every other (metric, aggregate) pairing"),
        }
    }

    /// Reduces `stats` against every threshold to a pass/fail list
    /// (spec.md §4.8). The caller's process exit code should be non-zero
    /// if any result fails.
    pub fn evaluate(thresholds: &[Threshold], stats: &Stats) -> Vec<ThresholdResult> {
        thresholds
            .iter()
            .map(|t| {
                let actual = Self::extract(t, stats);
                let pass = t.operator.apply(actual, t.target);
                let message = format!(
                    "{} {} {}: actual {actual:.3}, {}",
                    t.raw,
                    if pass { "passed" } else { "failed" },
                    t.operator.as_str(),
                    if pass { "within bound" } else { "out of bound" },
                );
                ThresholdResult {
                    threshold: t.raw.clone(),
                    actual_value: actual,
                    pass,
                    message,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_valid_predicate() {
        let t = ThresholdEvaluator::parse("http_req_duration:p99 < 300").unwrap();
        assert_eq!(t.target, 300.0);
        assert_eq!(t.operator, Operator::Lt);
    }

    #[test]
    fn rejects_unknown_metric() {
        assert!(ThresholdEvaluator::parse("bogus_metric:p99 < 300").is_err());
    }

    #[test]
    fn rejects_aggregate_not_valid_for_metric() {
        assert!(ThresholdEvaluator::parse("http_req_failed:p99 < 0.1").is_err());
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(ThresholdEvaluator::parse("http_req_duration:p99 < fast").is_err());
    }

    #[test]
    fn parse_all_rejects_the_whole_list_on_one_bad_entry() {
        let raws = vec![
            "http_req_duration:p99 < 300".to_string(),
            "not_a_metric:whatever < 1".to_string(),
        ];
        assert!(ThresholdEvaluator::parse_all(&raws).is_err());
    }

    #[test]
    fn threshold_fail_scenario_from_spec() {
        let mut collector_bucket = crate::metrics::Bucket::new();
        for _ in 0..100 {
            collector_bucket.record(Duration::from_millis(400), None, "", "");
        }
        let total = collector_bucket.snapshot(Duration::from_secs(5));
        let stats = Stats {
            total,
            endpoints: Default::default(),
            protocol_metrics: Default::default(),
            elapsed: Duration::from_secs(5),
        };

        let thresholds = ThresholdEvaluator::parse_all(&["http_req_duration:p99 < 300".to_string()]).unwrap();
        let results = ThresholdEvaluator::evaluate(&thresholds, &stats);
        assert_eq!(results.len(), 1);
        assert!(!results[0].pass);
    }

    #[test]
    fn equality_uses_epsilon() {
        let mut bucket = crate::metrics::Bucket::new();
        bucket.record(Duration::from_millis(10), None, "", "");
        let total = bucket.snapshot(Duration::from_secs(1));
        let stats = Stats {
            total,
            endpoints: Default::default(),
            protocol_metrics: Default::default(),
            elapsed: Duration::from_secs(1),
        };
        let thresholds =
            ThresholdEvaluator::parse_all(&["http_requests:count == 1".to_string()]).unwrap();
        let results = ThresholdEvaluator::evaluate(&thresholds, &stats);
        assert!(results[0].pass);
    }
}
