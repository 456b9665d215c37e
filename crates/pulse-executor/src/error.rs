//! Error types for pulse-executor.

use pulse_core::ErrorKind;
use pulse_ws::WsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("No broker token linked for user {0}")]
    MissingToken(String),

    #[error("Broker session error: {0}")]
    Ws(#[from] WsError),

    #[error("Store error: {0}")]
    Store(#[from] pulse_persistence::StoreError),

    #[error("Duplicate idempotency key: {0}")]
    Duplicate(String),
}

impl ExecError {
    /// Classify into the pipeline-wide taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingToken(_) => ErrorKind::Authentication,
            Self::Ws(e) => e.kind(),
            Self::Store(_) => ErrorKind::Internal,
            Self::Duplicate(_) => ErrorKind::Conflict,
        }
    }

    /// The code carried on a synthetic FAILED trade result. Broker
    /// business errors keep their mapped code; everything else reports
    /// its taxonomy kind.
    pub fn failure_code(&self) -> String {
        match self {
            Self::Ws(WsError::Broker { code, .. }) => code.to_string(),
            other => other.kind().to_string(),
        }
    }
}

pub type ExecResult<T> = Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_ws::BrokerErrorCode;

    #[test]
    fn test_failure_codes() {
        let e = ExecError::Ws(WsError::Broker {
            code: BrokerErrorCode::InsufficientBalance,
            message: "low".to_string(),
        });
        assert_eq!(e.failure_code(), "INSUFFICIENT_BALANCE");

        let e = ExecError::MissingToken("u1".to_string());
        assert_eq!(e.failure_code(), "AUTHENTICATION");

        let e = ExecError::Ws(WsError::Disconnected);
        assert_eq!(e.failure_code(), "CONNECTIVITY");
    }
}
