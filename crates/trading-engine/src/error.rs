use thiserror::Error;

/// Failures that abort a whole run. Per-candidate and per-item problems are
/// reported inside the run summaries instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("broker account unavailable")]
    AccountUnavailable,

    #[error("broker positions unavailable")]
    PositionsUnavailable,

    #[error("a run is already in progress for account {0}")]
    RunInProgress(String),

    #[error("signal source failed: {0:#}")]
    SignalSource(anyhow::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
