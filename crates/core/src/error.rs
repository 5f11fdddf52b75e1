// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Every failure of the orchestrator is recovered into one of these variants;
/// the HTTP layer maps them onto status codes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    /// Command ran but exited non-zero, timed out, or printed unusable output
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Tool output contradicts what was requested
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Tool refused to remove a backup inside its protection window
    #[error("{0}")]
    Protected(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
