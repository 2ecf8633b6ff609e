use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol tag attached to a sample. Short tags, matching the wire
/// vocabulary in spec.md §3 (`"http"|"websocket"|"sse"|"grpc"|""`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    WebSocket,
    Sse,
    Grpc,
    Unspecified,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::WebSocket => "websocket",
            Protocol::Sse => "sse",
            Protocol::Grpc => "grpc",
            Protocol::Unspecified => "",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol-level telemetry value a `RequestExecutor` may
/// attach to a sample. Modeled as a tagged sum per Design Notes §9
/// rather than `serde_json::Value`, so arithmetic per tag is explicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Str(String),
}

/// One recorded outcome from one logical request (spec.md §3 "Sample").
/// Retries collapse to exactly one `Sample` — the worker pool reports
/// only the final attempt.
#[derive(Debug, Clone)]
pub struct Sample {
    pub latency: Duration,
    /// `None` means success; `Some(classification)` means failure. The
    /// collector never introspects this beyond presence/absence —
    /// failure taxonomy belongs to the executor and `status_code`.
    pub error: Option<String>,
    pub endpoint: String,
    pub protocol: Protocol,
    /// Only meaningful when `error.is_some()`.
    pub status_code: String,
    pub custom_metrics: HashMap<String, MetricValue>,
}

impl Sample {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
