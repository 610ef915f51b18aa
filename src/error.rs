use thiserror::Error;

/// Custom error types for the phreg library.
#[derive(Error, Debug)]
pub enum PhregError {
    /// Error thrown when input dimensions (shapes) do not match expectation,
    /// e.g. a cumulative-sum output that is not one longer than its input or
    /// a permutation whose length differs from the dataset size.
    #[error("Dimension mismatch: {0}")]
    ShapeMismatch(String),

    /// Error thrown when an input value violates the caller contract:
    /// a non-finite linear predictor, a negative sample weight, a status
    /// outside {0, 1}, a start time at or after its event time, or an
    /// empty risk set at an observed event.
    #[error("Domain violation at index {index}: {reason}")]
    Domain {
        /// Position of the offending subject or event.
        index: usize,
        /// What was violated.
        reason: String,
    },

    /// Error thrown when an operation is requested in a state that cannot
    /// support it (e.g. a Hessian product before any deviance evaluation).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
