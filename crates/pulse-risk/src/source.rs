//! User risk state capability.
//!
//! The guard never reaches into a global for per-user limits: it is
//! handed a `UserRiskSource` at construction. Tests and the composition
//! root supply the in-memory implementation; a deployment can back it
//! with whatever store it likes.

use parking_lot::RwLock;
use pulse_core::UserRiskState;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Read/update access to per-user risk state.
pub trait UserRiskSource: Send + Sync {
    /// Current risk state for a user, `None` when unknown.
    fn risk_state(&self, user_id: &str) -> Option<UserRiskState>;

    /// Fold a settlement outcome into the user's counters.
    fn apply_outcome(&self, user_id: &str, pnl: Decimal);

    /// Count one executed trade against the user's session budget.
    fn record_trade(&self, user_id: &str);
}

/// In-memory risk state keyed by user id.
#[derive(Default)]
pub struct InMemoryUserRisk {
    states: RwLock<HashMap<String, UserRiskState>>,
}

impl InMemoryUserRisk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, state: UserRiskState) {
        self.states.write().insert(user_id.into(), state);
    }
}

impl UserRiskSource for InMemoryUserRisk {
    fn risk_state(&self, user_id: &str) -> Option<UserRiskState> {
        self.states.read().get(user_id).cloned()
    }

    fn apply_outcome(&self, user_id: &str, pnl: Decimal) {
        let mut states = self.states.write();
        let state = states.entry(user_id.to_string()).or_default();
        if pnl < Decimal::ZERO {
            state.current_drawdown += -pnl;
            state.current_daily_loss += -pnl;
        } else {
            // Wins claw the drawdown back, never below zero.
            state.current_drawdown = (state.current_drawdown - pnl).max(Decimal::ZERO);
        }
    }

    fn record_trade(&self, user_id: &str) {
        let mut states = self.states.write();
        states.entry(user_id.to_string()).or_default().trades_today += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_outcomes_accumulate() {
        let source = InMemoryUserRisk::new();
        source.insert("u1", UserRiskState::default());

        source.apply_outcome("u1", dec!(-25));
        source.apply_outcome("u1", dec!(-10));
        let state = source.risk_state("u1").unwrap();
        assert_eq!(state.current_drawdown, dec!(35));
        assert_eq!(state.current_daily_loss, dec!(35));

        // A win reduces drawdown but not the daily loss tally.
        source.apply_outcome("u1", dec!(20));
        let state = source.risk_state("u1").unwrap();
        assert_eq!(state.current_drawdown, dec!(15));
        assert_eq!(state.current_daily_loss, dec!(35));
    }

    #[test]
    fn test_drawdown_floors_at_zero() {
        let source = InMemoryUserRisk::new();
        source.insert("u1", UserRiskState::default());
        source.apply_outcome("u1", dec!(100));
        assert_eq!(source.risk_state("u1").unwrap().current_drawdown, dec!(0));
    }

    #[test]
    fn test_record_trade_counts() {
        let source = InMemoryUserRisk::new();
        source.insert("u1", UserRiskState::default());
        source.record_trade("u1");
        source.record_trade("u1");
        assert_eq!(source.risk_state("u1").unwrap().trades_today, 2);
    }
}
