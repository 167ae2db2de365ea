//! Error types for the churn pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ChurnError>;

/// Main error type for the churn pipeline.
///
/// Every variant is a local, caller-recoverable condition. Nothing in the
/// crate retries on error: these are data-quality problems, not transient
/// faults.
#[derive(Error, Debug)]
pub enum ChurnError {
    /// Malformed or missing column declarations
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Degenerate fit input for a single column
    #[error("Empty column '{field}': {reason}")]
    EmptyColumnError { field: String, reason: String },

    /// A train/test split cannot be produced from the data
    #[error("Insufficient data: {0}")]
    InsufficientDataError(String),

    /// A model cannot be trained from the given labels
    #[error("Fit error: {0}")]
    FitError(String),

    /// Dimension mismatch between fit-time and call-time inputs
    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    /// Parameter outside its valid range
    #[error("Invalid parameter: {name} = {value}, {reason}")]
    RangeError {
        name: String,
        value: String,
        reason: String,
    },

    /// A cell that cannot be encoded under the fitted state
    #[error("Invalid value in field '{field}' at row {row}: {reason}")]
    InvalidValue {
        field: String,
        row: usize,
        reason: String,
    },

    /// Target value outside {0, 1}
    #[error("Invalid label at row {row}: {value} (expected 0 or 1)")]
    InvalidLabel { row: usize, value: String },

    #[error("Model not fitted")]
    NotFitted,

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ChurnError {
    /// Shorthand for a [`ChurnError::RangeError`]
    pub fn range(name: &str, value: impl ToString, reason: &str) -> Self {
        ChurnError::RangeError {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a [`ChurnError::ShapeError`]
    pub fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ChurnError::ShapeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<polars::error::PolarsError> for ChurnError {
    fn from(err: polars::error::PolarsError) -> Self {
        ChurnError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ChurnError {
    fn from(err: serde_json::Error) -> Self {
        ChurnError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for ChurnError {
    fn from(err: bincode::Error) -> Self {
        ChurnError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ChurnError {
    fn from(err: ndarray::ShapeError) -> Self {
        ChurnError::ShapeError {
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
        let err = ChurnError::SchemaError("no feature columns".to_string());
        assert_eq!(err.to_string(), "Schema error: no feature columns");

        let err = ChurnError::range("top_n", 0, "must be positive");
        assert_eq!(err.to_string(), "Invalid parameter: top_n = 0, must be positive");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ChurnError = io_err.into();
        assert!(matches!(err, ChurnError::IoError(_)));
    }
}
