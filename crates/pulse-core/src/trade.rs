//! Trade lifecycle outcomes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Terminal broker outcome for a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementOutcome {
    Win,
    Loss,
}

/// Trade lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    /// Buy confirmed by the broker, awaiting settlement.
    Submitted,
    Won,
    Lost,
    /// Failed before or at buy; carries the mapped error code in metadata.
    Failed,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Won => write!(f, "WON"),
            Self::Lost => write!(f, "LOST"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Execution context attached to a trade result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeMetadata {
    pub market: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_ref: Option<String>,
    /// Confidence of the signal that produced this trade.
    pub risk_confidence: f64,
    /// Mapped error code on FAILED trades.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// One executed (or failed) trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub trade_id: String,
    pub user_id: String,
    pub session_id: String,
    pub status: TradeStatus,
    pub pnl: Decimal,
    pub executed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    pub metadata: TradeMetadata,
}

impl TradeResult {
    /// Whether this trade reached a terminal settlement status.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, TradeStatus::Won | TradeStatus::Lost)
    }
}
