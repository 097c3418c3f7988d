use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures surfaced by the eligibility core.
///
/// An empty result is never used to signal one of these; callers can tell
/// "no rows matched" apart from a failure by the `Result` alone.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A recognized criterion carries a value that cannot be used.
    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),

    /// A criterion key, or a pipeline name, outside the recognized set.
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid ranking weights: {0}")]
    InvalidWeights(String),

    /// Store failure, propagated unchanged.
    #[error("data access failed: {0}")]
    DataAccess(#[from] sqlx::Error),
}
