use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Validation failures raised by the numeric engine. Each one aborts the
/// single computation that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid odds {0}: decimal odds must be finite and > 1")]
    InvalidOdds(f64),

    #[error("invalid flip value {0}: must be finite and > 0")]
    InvalidFlip(f64),

    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("at least 2 teams are required to fit strengths, got {0}")]
    InsufficientTeams(usize),

    #[error("no matches to fit strengths")]
    NoMatches,

    #[error("singular system at column {column} (best pivot {pivot:e}): not enough information to solve strengths")]
    SingularSystem { column: usize, pivot: f64 },

    #[error("inferred implied probability {0} is outside (0, 1)")]
    InvalidResult(f64),

    #[error("invalid half-life {0} days: must be finite and > 0")]
    InvalidHalfLife(f64),
}

/// Failures of the persistence layer that callers need to tell apart. They
/// travel inside `anyhow::Error` and can be recovered with `downcast_ref`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}
