//! Risk guard inputs and decisions.

use crate::signal::Signal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-user risk limits and running counters.
///
/// Counters are mutated by settlement outcomes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRiskState {
    pub max_drawdown: Decimal,
    pub max_daily_loss: Decimal,
    pub max_trades_per_session: u32,
    pub current_drawdown: Decimal,
    pub current_daily_loss: Decimal,
    pub trades_today: u32,
    pub is_opted_out: bool,
}

impl Default for UserRiskState {
    fn default() -> Self {
        Self {
            max_drawdown: Decimal::from(200),
            max_daily_loss: Decimal::from(100),
            max_trades_per_session: 20,
            current_drawdown: Decimal::ZERO,
            current_daily_loss: Decimal::ZERO,
            trades_today: 0,
            is_opted_out: false,
        }
    }
}

impl UserRiskState {
    /// Drawdown consumed as a fraction of the limit, 0 when no limit is set.
    pub fn drawdown_ratio(&self) -> Decimal {
        if self.max_drawdown.is_zero() {
            Decimal::ZERO
        } else {
            self.current_drawdown / self.max_drawdown
        }
    }

    /// Daily loss consumed as a fraction of the limit, 0 when no limit is set.
    pub fn loss_ratio(&self) -> Decimal {
        if self.max_daily_loss.is_zero() {
            Decimal::ZERO
        } else {
            self.current_daily_loss / self.max_daily_loss
        }
    }
}

/// Why a risk check rejected, in gate-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    // User gate (priority 1).
    UserOptedOut,
    UserMaxDrawdownReached,
    UserDailyLossLimit,
    UserMaxTradesReached,
    // Session gate (priority 2).
    SessionPaused,
    SessionLossThreshold,
    // Signal gate (priority 3).
    MarketNotAllowed,
    MinConfidenceNotMet,
    // Stake gate (priority 4).
    SessionMaxStakeExceeded,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UserOptedOut => "USER_OPTED_OUT",
            Self::UserMaxDrawdownReached => "USER_MAX_DRAWDOWN_REACHED",
            Self::UserDailyLossLimit => "USER_DAILY_LOSS_LIMIT",
            Self::UserMaxTradesReached => "USER_MAX_TRADES_REACHED",
            Self::SessionPaused => "SESSION_PAUSED",
            Self::SessionLossThreshold => "SESSION_LOSS_THRESHOLD",
            Self::MarketNotAllowed => "MARKET_NOT_ALLOWED",
            Self::MinConfidenceNotMet => "MIN_CONFIDENCE_NOT_MET",
            Self::SessionMaxStakeExceeded => "SESSION_MAX_STAKE_EXCEEDED",
        };
        write!(f, "{s}")
    }
}

/// Approve or reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskVerdict {
    Approved,
    Rejected,
}

/// The risk guard's decision for one (signal, participant) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheck {
    pub user_id: String,
    pub session_id: String,
    pub result: RiskVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub proposed_trade: Signal,
    pub stake: Decimal,
    /// Optional memory-capture record id carried through to settlement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<String>,
}

impl RiskCheck {
    pub fn is_approved(&self) -> bool {
        self.result == RiskVerdict::Approved
    }
}
