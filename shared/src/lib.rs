//! Shared types for the incremental labeling workspace
//!
//! Contains the data model, typed configuration, error type and logging
//! stack used by the labeling engine and by anything that serves its API.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::*;
pub use errors::*;
pub use logging::{log_error, log_shutdown, log_startup, log_success, Component};
pub use types::*;
