use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::sample::{MetricValue, Protocol};

/// One record handed to an executor by a [`RequestDataSource`] — e.g. a
/// templated payload, a feeder row, or a HAR entry. Opaque to the core
/// engine; protocol drivers interpret the contents.
#[derive(Debug, Clone)]
pub struct DataSourceItem {
    pub fields: HashMap<String, String>,
}

/// Optional inbound dependency supplying per-request data (spec.md §6
/// "RequestDataSource"). Feeder file parsing, HAR import, and
/// templating all live outside the core engine and implement this.
#[async_trait]
pub trait RequestDataSource: Send + Sync {
    /// Returns the next record. `exhausted == true` means the source is
    /// finite and has no more records; `record` is then meaningless.
    async fn next(&self) -> DataSourceOutcome;
}

#[derive(Debug, Clone)]
pub enum DataSourceOutcome {
    Item(DataSourceItem),
    Exhausted,
}

/// The verdict an executor reports for one attempt (spec.md §4.6
/// "Retry policy: controlled by the executor classifying its own error
/// as retryable or not").
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub error: Option<String>,
    pub retryable: bool,
    pub status_code: String,
    pub protocol: Protocol,
    pub custom_metrics: HashMap<String, MetricValue>,
}

impl ExecutionOutcome {
    pub fn success(protocol: Protocol) -> Self {
        Self {
            error: None,
            retryable: false,
            status_code: String::new(),
            protocol,
            custom_metrics: HashMap::new(),
        }
    }

    pub fn failure(protocol: Protocol, status_code: impl Into<String>, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            error: Some(error.into()),
            retryable,
            status_code: status_code.into(),
            protocol,
            custom_metrics: HashMap::new(),
        }
    }
}

/// Inbound dependency the worker pool drives: one concrete
/// implementation per protocol (HTTP, WebSocket, SSE, gRPC), supplied
/// by the protocol-driver layer outside this engine's scope (spec.md §6
/// "RequestExecutor").
///
/// Must tolerate concurrent invocation by up to `C` workers and must
/// honor the cancellation token passed to `execute`, returning within a
/// reasonable bound after it fires.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Executes one logical request against `endpoint`, optionally fed
    /// by `data`. Latency is measured by the worker pool around this
    /// call, not self-reported, so implementations need not track their
    /// own wall clock.
    async fn execute(&self, endpoint: &Endpoint, data: Option<&DataSourceItem>) -> ExecutionOutcome;

    /// Upper bound an implementation expects `execute` to honor after
    /// its internal cancellation path fires. Used only as a hint by the
    /// pool's drain-timeout calculation; defaults to a conservative 5s.
    fn cancellation_grace(&self) -> Duration {
        Duration::from_secs(5)
    }
}
