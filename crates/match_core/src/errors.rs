//! Error types for the OrganMatch core

use thiserror::Error;

/// Errors that can occur in the core crate
#[derive(Error, Debug)]
pub enum CoreError {
    /// Hyperparameter outside its accepted range
    #[error("Invalid model parameters: {0}")]
    InvalidParameters(String),

    /// A requested feature column does not exist
    #[error("Unknown feature column: {0}")]
    UnknownFeature(String),

    /// Forest structure failed validation
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    /// Stored bundle hash does not match its contents
    #[error("Model integrity mismatch: expected {expected}, found {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// Canonical serialization failed
    #[error("Canonical serialization error: {0}")]
    Canonical(#[from] crate::serde_canon::CanonicalError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
