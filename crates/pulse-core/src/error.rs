//! Error types for pulse-core.

use crate::session::SessionStatus;
use thiserror::Error;

/// Coarse error classification shared across the pipeline.
///
/// Every error surfaced by a pulse crate maps onto exactly one kind; the
/// kind decides whether the error is logged locally, surfaced as a FAILED
/// trade event, or treated as fatal at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Schema violations: malformed ticks, out-of-bounds stakes or durations.
    Validation,
    /// Socket closes, request timeouts, open circuit breaker.
    Connectivity,
    /// Missing broker token or broker auth rejection.
    Authentication,
    /// User opted out or a risk limit was hit.
    Authorization,
    /// Duplicate idempotency key or invalid state transition.
    Conflict,
    /// Broker-side business rejection (market closed, insufficient balance).
    BrokerBusiness,
    /// Unexpected internal failure.
    Internal,
    /// Request, settlement, or heartbeat deadline expired.
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Connectivity => write!(f, "CONNECTIVITY"),
            Self::Authentication => write!(f, "AUTHENTICATION"),
            Self::Authorization => write!(f, "AUTHORIZATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::BrokerBusiness => write!(f, "BROKER_BUSINESS"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid tick: {0}")]
    InvalidTick(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session full: max {max} participants")]
    SessionFull { max: usize },

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Classify this error into the pipeline-wide taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTick(_) | Self::InvalidConfig(_) | Self::Json(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::SessionFull { .. } => ErrorKind::Conflict,
            Self::UnknownSession(_) | Self::UnknownParticipant(_) => ErrorKind::Validation,
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
