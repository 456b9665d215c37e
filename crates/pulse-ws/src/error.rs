//! WebSocket error types and broker error-code mapping.

use pulse_core::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Broker error codes mapped to a fixed enum.
///
/// Unmapped codes become `Unknown`; the original message is always kept
/// alongside for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerErrorCode {
    AuthorizationRequired,
    InvalidToken,
    MarketClosed,
    InsufficientBalance,
    Unknown,
}

impl BrokerErrorCode {
    /// Map a wire code onto the fixed enum.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "AuthorizationRequired" => Self::AuthorizationRequired,
            "InvalidToken" => Self::InvalidToken,
            "MarketIsClosed" => Self::MarketClosed,
            "InsufficientBalance" => Self::InsufficientBalance,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for BrokerErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthorizationRequired => write!(f, "AUTHORIZATION_REQUIRED"),
            Self::InvalidToken => write!(f, "INVALID_TOKEN"),
            Self::MarketClosed => write!(f, "MARKET_CLOSED"),
            Self::InsufficientBalance => write!(f, "INSUFFICIENT_BALANCE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Disconnected")]
    Disconnected,

    #[error("Request {req_id} timed out")]
    RequestTimeout { req_id: u64 },

    #[error("Circuit breaker open")]
    CircuitOpen,

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Broker error {code}: {message}")]
    Broker {
        code: BrokerErrorCode,
        message: String,
    },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Classify into the pipeline-wide taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed(_)
            | Self::ConnectionClosed { .. }
            | Self::Disconnected
            | Self::CircuitOpen
            | Self::Tungstenite(_) => ErrorKind::Connectivity,
            Self::ConnectTimeout(_) | Self::RequestTimeout { .. } | Self::HeartbeatTimeout => {
                ErrorKind::Timeout
            }
            Self::Broker { code, .. } => match code {
                BrokerErrorCode::AuthorizationRequired | BrokerErrorCode::InvalidToken => {
                    ErrorKind::Authentication
                }
                _ => ErrorKind::BrokerBusiness,
            },
            Self::MalformedFrame(_) | Self::Json(_) => ErrorKind::Validation,
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            BrokerErrorCode::from_wire("AuthorizationRequired"),
            BrokerErrorCode::AuthorizationRequired
        );
        assert_eq!(
            BrokerErrorCode::from_wire("InvalidToken"),
            BrokerErrorCode::InvalidToken
        );
        assert_eq!(
            BrokerErrorCode::from_wire("MarketIsClosed"),
            BrokerErrorCode::MarketClosed
        );
        assert_eq!(
            BrokerErrorCode::from_wire("InsufficientBalance"),
            BrokerErrorCode::InsufficientBalance
        );
        assert_eq!(
            BrokerErrorCode::from_wire("SomeNewCode"),
            BrokerErrorCode::Unknown
        );
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(WsError::Disconnected.kind(), ErrorKind::Connectivity);
        assert_eq!(
            WsError::RequestTimeout { req_id: 7 }.kind(),
            ErrorKind::Timeout
        );
        let auth = WsError::Broker {
            code: BrokerErrorCode::InvalidToken,
            message: "bad token".to_string(),
        };
        assert_eq!(auth.kind(), ErrorKind::Authentication);
        let business = WsError::Broker {
            code: BrokerErrorCode::MarketClosed,
            message: "closed".to_string(),
        };
        assert_eq!(business.kind(), ErrorKind::BrokerBusiness);
    }
}
