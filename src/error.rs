use thiserror::Error;

/// Unified error type for configuration and lifecycle failures.
///
/// Individual request failures never surface here — they are recorded as
/// [`crate::Sample`]s and folded into [`crate::Stats`]. This type only
/// covers the "fatal at setup" and "runner misuse" classes from the error
/// taxonomy.
#[derive(Debug, Error)]
pub enum LoadcoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid threshold {raw:?}: {reason}")]
    InvalidThreshold { raw: String, reason: String },

    #[error("runner is not idle (current state: {0:?})")]
    NotIdle(crate::runner::RunnerState),

    #[error("histogram range error: {0}")]
    Histogram(String),
}

pub type Result<T> = std::result::Result<T, LoadcoreError>;
