use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BPError {
    #[error("Factor dimension mismatch: expected arity {expected}, found {found}.")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Invalid configuration: {0}.")]
    InvalidConfiguration(String),
    #[error("Every entry of the factor is negative infinity, cannot normalize.")]
    DegenerateDistribution,
    #[error("Failed to build worker pool: {0}.")]
    ThreadPool(String),
}

impl BPError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        BPError::InvalidConfiguration(message.into())
    }
}

// Checks that two arities agree, reporting the first as the expected one
pub fn check_arity(expected: usize, found: usize) -> Result<(), BPError> {
    if expected == found {
        Ok(())
    } else {
        Err(BPError::DimensionMismatch { expected, found })
    }
}
