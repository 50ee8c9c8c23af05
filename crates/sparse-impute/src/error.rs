//! Error types for the filter / impute / select pipeline.
//!
//! All library operations return [`ImputeError`] via the crate-wide
//! [`Result`] alias. Errors are serializable as `{code, message}` so that a
//! caller can forward them as JSON (the CLI does this under `--json`).

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the imputation pipeline.
#[derive(Error, Debug)]
pub enum ImputeError {
    /// Pipeline was cancelled through its cancellation token.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// The matrix has zero rows or zero columns where data is required.
    #[error("Matrix has invalid shape ({rows} rows x {columns} columns): {reason}")]
    InputShape {
        rows: usize,
        columns: usize,
        reason: String,
    },

    /// A parameter was rejected before any work was scheduled.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Evaluating a single candidate K failed.
    #[error("Evaluation failed for K={k}: {reason}")]
    EvaluationFailed { k: usize, reason: String },

    /// A row key or column name occurs more than once.
    #[error("Duplicate {axis} key '{key}'")]
    DuplicateKey { axis: &'static str, key: String },

    /// Cell buffer does not match the declared row and column counts.
    #[error("Matrix shape mismatch: expected {expected} cells, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A loaded column could not be interpreted as numbers.
    #[error("Column '{column}' is not numeric (dtype {dtype})")]
    NonNumericColumn { column: String, dtype: String },

    /// Internal error (e.g., worker pool construction failure).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ImputeError>,
    },
}

impl ImputeError {
    /// Shorthand for [`ImputeError::InvalidParameter`].
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ImputeError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ImputeError::EvaluationFailed`].
    pub fn evaluation_failed(k: usize, reason: impl Into<String>) -> Self {
        ImputeError::EvaluationFailed {
            k,
            reason: reason.into(),
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ImputeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::InputShape { .. } => "INPUT_SHAPE",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::EvaluationFailed { .. } => "EVALUATION_FAILED",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::NonNumericColumn { .. } => "NON_NUMERIC_COLUMN",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The innermost error, with all context layers stripped.
    pub fn root(&self) -> &ImputeError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl Serialize for ImputeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ImputeError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for imputation operations.
pub type Result<T> = std::result::Result<T, ImputeError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ImputeError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ImputeError::Io(e).with_context(context))
    }
}
