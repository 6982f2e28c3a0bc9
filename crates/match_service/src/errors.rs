//! Service error types

use organmatch_core::{CoreError, RecordId};
use organmatch_trainer::TrainerError;
use thiserror::Error;

/// Service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Match already recorded for donor {donor_id} / recipient {recipient_id}")]
    PersistenceConflict {
        donor_id: RecordId,
        recipient_id: RecordId,
    },

    #[error("Unknown donor: {0}")]
    UnknownDonor(RecordId),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(RecordId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Trainer(#[from] TrainerError),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
