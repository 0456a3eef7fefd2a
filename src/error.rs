use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SsfError {
    #[error("invalid variance: {0} (must be positive and finite)")]
    InvalidVariance(f64),

    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("non-stationary AR polynomial")]
    NonStationary,

    #[error("not supported for this configuration: {0}")]
    Unsupported(String),

    #[error("model error: {0}")]
    ModelError(String),

    #[error("data error: {0}")]
    DataError(String),

    #[error("optimization failed: {0}")]
    Optimization(String),
}

pub type Result<T> = std::result::Result<T, SsfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_variance_message() {
        let err = SsfError::InvalidVariance(-1.5);
        assert_eq!(
            err.to_string(),
            "invalid variance: -1.5 (must be positive and finite)"
        );
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = SsfError::DimensionMismatch {
            what: "a0",
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "dimension mismatch for a0: expected 3, got 2");
    }
}
