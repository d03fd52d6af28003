use thiserror::Error;

/// Errors surfaced by funnel validation, plan building, parameter binding
/// and result analysis.
///
/// Transport and backend failures are not represented here; the executor
/// boundary traits return `anyhow::Result` and own those.
#[derive(Debug, Error)]
pub enum FunnelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("first funnel step matched no users")]
    EmptyFunnel,

    #[error("step not found in funnel result: {0}")]
    StepNotFound(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("missing query parameter: {0}")]
    MissingParameter(String),
}
