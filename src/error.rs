//! Error taxonomy
//!
//! Each layer reports its own error type; the dispatcher folds store and
//! answer-service failures into `DispatchError`. A conversation that has
//! never been seen is not an error anywhere in the crate.

use std::time::Duration;
use thiserror::Error;

/// Invalid or missing start-up configuration. Fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// History store failure. Recoverable per call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store unreachable: {0}")]
    Connectivity(String),

    #[error("history store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("history document could not be encoded or decoded: {0}")]
    Serialization(String),
}

/// Remote answer service failure. Never crashes the process.
#[derive(Debug, Error)]
pub enum AnswerServiceError {
    #[error("answer service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("answer service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("answer service returned a malformed payload: {0}")]
    Malformed(String),

    #[error("answer service did not respond within {0:?}")]
    Timeout(Duration),
}

/// Failure of one dialogue turn.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Answer(#[from] AnswerServiceError),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match *err.kind {
            mongodb::error::ErrorKind::BsonDeserialization(_)
            | mongodb::error::ErrorKind::BsonSerialization(_) => {
                StoreError::Serialization(err.to_string())
            }
            _ => StoreError::Connectivity(err.to_string()),
        }
    }
}
