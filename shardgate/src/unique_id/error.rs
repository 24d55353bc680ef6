use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("worker id exceeding maximum ({max}): {value}")]
    InvalidWorkerId { value: i64, max: u64 },

    #[error("max vibration offset must be between 0 and {max}: {value}")]
    InvalidVibrationOffset { value: i64, max: u64 },

    #[error("step must be positive: {0}")]
    InvalidStep(i64),

    #[error("initial value must not be negative: {0}")]
    InvalidInitialValue(i64),

    #[error("unsupported coordination endpoint: \"{0}\"")]
    UnsupportedEndpoint(String),

    #[error("missing property \"{0}\"")]
    MissingProperty(&'static str),

    #[error("config: {0}")]
    Config(#[from] shardgate_config::Error),

    #[error("clock moved backwards: last timestamp {last_ms}ms, now {now_ms}ms")]
    ClockRegression { last_ms: u64, now_ms: u64 },

    #[error("timestamp out of range: {0}ms")]
    TimestampOutOfRange(u64),

    #[error("coordination service unavailable for \"{namespace}\" after {attempts} attempts ({elapsed:?})")]
    CoordinationUnavailable {
        namespace: String,
        attempts: usize,
        elapsed: Duration,
    },

    #[error("coordination: {0}")]
    Coordination(String),

    #[error("sequence exhausted for \"{0}\"")]
    SequenceExhausted(String),
}

impl Error {
    /// The caller can try again later and may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ClockRegression { .. } | Self::CoordinationUnavailable { .. }
        )
    }

    /// The generator was configured incorrectly.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidWorkerId { .. }
                | Self::InvalidVibrationOffset { .. }
                | Self::InvalidStep(_)
                | Self::InvalidInitialValue(_)
                | Self::UnsupportedEndpoint(_)
                | Self::MissingProperty(_)
                | Self::Config(_)
        )
    }
}
