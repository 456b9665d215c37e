//! Error types for pulse-registry.

use pulse_core::SessionStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown participant {user_id} in session {session_id}")]
    UnknownParticipant {
        session_id: String,
        user_id: String,
    },

    #[error("Session full: max {max} participants")]
    SessionFull { max: usize },

    #[error("Store error: {0}")]
    Store(#[from] pulse_persistence::StoreError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
