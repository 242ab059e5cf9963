//! Shared error types for the incremental labeling workspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Failed to read configuration file {path}: {message}")]
    ConfigUnreadable { path: String, message: String },
}

impl SharedError {
    pub fn invalid_config(field: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
