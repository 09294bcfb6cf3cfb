//! Error types for the classification pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Validation failure for a single raw input value.
///
/// Always surfaced to the caller; values are never clamped or defaulted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Unknown category for '{field}': {value:?}")]
    UnknownCategory { field: String, value: String },

    #[error("Value for '{field}' out of bounds: {value} not in [{min}, {max}]")]
    OutOfBounds {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Value for '{field}' not allowed: {value}")]
    NotAllowed { field: String, value: f64 },

    #[error("Non-numeric value for '{field}': {raw:?}")]
    NotNumeric { field: String, raw: String },

    #[error("Non-finite value for '{field}'")]
    NonFinite { field: String },

    #[error("Categorical field '{field}' expects text, got number {value}")]
    ExpectedCategory { field: String, value: f64 },

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Unexpected field: {0}")]
    UnexpectedField(String),
}

impl EncodingError {
    /// Name of the field that failed validation
    pub fn field(&self) -> &str {
        match self {
            EncodingError::UnknownCategory { field, .. }
            | EncodingError::OutOfBounds { field, .. }
            | EncodingError::NotAllowed { field, .. }
            | EncodingError::NotNumeric { field, .. }
            | EncodingError::NonFinite { field }
            | EncodingError::ExpectedCategory { field, .. } => field,
            EncodingError::MissingField(field) | EncodingError::UnexpectedField(field) => field,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Invalid dataset: {0}")]
    Dataset(String),

    #[error("Model not trained")]
    UntrainedModel,

    #[error("Inconsistent model: {0}")]
    CorruptModel(String),

    #[error("No resident model for cache key {0}")]
    NotResident(String),

    #[error("Persistence error at {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Schema mismatch: model trained on {expected:?}, schema has {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(&'static str),

    #[error("Training cancelled")]
    Cancelled,

    #[error("Training timed out")]
    TimedOut,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClassifierError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ClassifierError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
