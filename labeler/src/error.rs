//! Labeler-specific error types

use shared::{PredictionKey, SharedError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelerError {
    #[error("Unknown schema: {schema_name}")]
    UnknownSchema { schema_name: String },

    #[error("No high-confidence examples available for schema: {schema_name}")]
    NoExamples { schema_name: String },

    #[error("Generation collaborator is unavailable")]
    GeneratorUnavailable,

    #[error("Generation failed for {key}: {message}")]
    GenerationFailed { key: PredictionKey, message: String },

    #[error("Model reply for {key} contained no usable label")]
    NoUsableLabel { key: PredictionKey },

    #[error("No prediction stored for {key}")]
    PredictionNotFound { key: PredictionKey },

    #[error("Prediction {key} was already verified")]
    AlreadyVerified { key: PredictionKey },

    #[error("Collaborator store failed: {message}")]
    StoreError { message: String },

    #[error("Snapshot persistence failed: {operation} on {path}: {message}")]
    PersistenceError {
        operation: String,
        path: String,
        message: String,
    },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LabelerError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
        }
    }

    pub fn persistence(operation: &str, path: impl std::fmt::Display, message: impl ToString) -> Self {
        Self::PersistenceError {
            operation: operation.to_string(),
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// Precondition failures are expected while the engine warms up
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LabelerError::UnknownSchema { .. } | LabelerError::NoExamples { .. } | LabelerError::GeneratorUnavailable
        )
    }
}

pub type LabelerResult<T> = Result<T, LabelerError>;
