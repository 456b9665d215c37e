//! Error types for pulse-persistence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Malformed row: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("KV unavailable: {0}")]
    Unavailable(String),
}
