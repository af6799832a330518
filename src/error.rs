use thiserror::Error;

/// Crate-wide error type. Internal to the engine — `AmasEngine::process_event`
/// never surfaces this to callers; it is caught at the orchestrator boundary
/// and converted into a degraded `ProcessResult` via `intelligentFallback`.
#[derive(Debug, Error)]
pub enum AmasError {
    #[error("anomalous value for {field}: {value}")]
    Anomaly { field: &'static str, value: f64 },

    #[error("circuit breaker open for user")]
    CircuitOpen,

    #[error("processing timed out")]
    Timeout,

    #[error("processing was cancelled")]
    Cancelled,

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AmasError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AmasError::Cancelled)
    }
}
