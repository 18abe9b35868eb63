// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type. Per , only `Domain`
/// (configuration / invariant violations) is allowed to propagate out of the
/// dispatcher, executor, or plugin loops — every other variant is caught at
/// its boundary, logged, and turned into a telemetry event or a job state
/// transition.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Adapter-crate boundary for `sqlx::Error` and friends (see
    /// `crates/core/src/port/storage_adapter.rs`'s doc comment: `core`
    /// cannot implement `From<sqlx::Error>` without depending on `sqlx`).
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Storage(err)
    }
}
