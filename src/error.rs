//! Error types for ForestShield

use thiserror::Error;

/// Result type alias for ForestShield operations
pub type Result<T> = std::result::Result<T, ForestShieldError>;

/// Main error type for the training pipeline and the classifier
#[derive(Error, Debug)]
pub enum ForestShieldError {
    /// Missing, unreadable or malformed dataset
    #[error("Data error: {0}")]
    DataError(String),

    /// A class is too small for the oversampling neighbourhood
    #[error("Balance error: class {class} has {count} samples, need at least {required}")]
    BalanceError {
        class: i64,
        count: usize,
        required: usize,
    },

    /// Feature count mismatch between an input and the fitted scaler
    #[error("Scaling error: expected {expected} features, got {actual}")]
    ScalingError { expected: usize, actual: usize },

    /// Named feature mismatch between an input and the fitted schema
    #[error("Schema mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Degenerate training data or failed search
    #[error("Fit error: {0}")]
    FitError(String),

    /// Artifact missing or corrupt at load time, or failed write
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ForestShieldError {
    /// Whether the error was caused by the caller's input rather than the
    /// service. Inference surfaces these as client errors.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForestShieldError::ScalingError { .. }
                | ForestShieldError::SchemaMismatch { .. }
                | ForestShieldError::InvalidInput(_)
        )
    }
}

impl From<polars::error::PolarsError> for ForestShieldError {
    fn from(err: polars::error::PolarsError) -> Self {
        ForestShieldError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ForestShieldError {
    fn from(err: serde_json::Error) -> Self {
        ForestShieldError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for ForestShieldError {
    fn from(err: bincode::Error) -> Self {
        ForestShieldError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ForestShieldError {
    fn from(err: ndarray::ShapeError) -> Self {
        ForestShieldError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForestShieldError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");

        let err = ForestShieldError::ScalingError { expected: 8, actual: 7 };
        assert_eq!(err.to_string(), "Scaling error: expected 8 features, got 7");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ForestShieldError = io_err.into();
        assert!(matches!(err, ForestShieldError::IoError(_)));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ForestShieldError::ScalingError { expected: 8, actual: 7 }.is_client_error());
        assert!(ForestShieldError::InvalidInput("x".into()).is_client_error());
        assert!(!ForestShieldError::FitError("x".into()).is_client_error());
        assert!(!ForestShieldError::PersistenceError("x".into()).is_client_error());
    }
}
