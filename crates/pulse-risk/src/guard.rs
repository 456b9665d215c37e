//! Layered admission rules.
//!
//! Rules run in fixed priority and the first rejection wins:
//! 1. user gate (opt-out, drawdown, daily loss, trade count)
//! 2. session gate (paused, global loss threshold)
//! 3. signal gate (market allowed, confidence floor)
//! 4. stake gate (session max stake scaled by the profile)
//!
//! Every evaluation — approved or rejected — emits
//! `risk_check_completed` on the event bus.

use pulse_core::{
    EventBus, PipelineEvent, RejectReason, RiskCheck, RiskProfile, RiskProfileParams, RiskVerdict,
    Session, Signal, UserRiskState,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Profile parameter table, seeded with the built-ins and overridable
/// from configuration.
#[derive(Debug, Clone)]
pub struct RiskProfileTable {
    profiles: HashMap<RiskProfile, RiskProfileParams>,
}

impl Default for RiskProfileTable {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        for profile in [RiskProfile::Low, RiskProfile::Medium, RiskProfile::High] {
            profiles.insert(profile, profile.params());
        }
        Self { profiles }
    }
}

impl RiskProfileTable {
    pub fn with_override(mut self, profile: RiskProfile, params: RiskProfileParams) -> Self {
        self.profiles.insert(profile, params);
        self
    }

    pub fn params(&self, profile: RiskProfile) -> RiskProfileParams {
        self.profiles
            .get(&profile)
            .copied()
            .unwrap_or_else(|| profile.params())
    }
}

/// The risk guard.
pub struct RiskGuard {
    profiles: RiskProfileTable,
    events: EventBus,
}

impl RiskGuard {
    pub fn new(profiles: RiskProfileTable, events: EventBus) -> Self {
        Self { profiles, events }
    }

    /// Validate one (signal, participant) pair against a session.
    ///
    /// The session snapshot provides the config and aggregated PnL; the
    /// user's risk state provides the personal limits.
    pub fn validate(
        &self,
        signal: &Signal,
        session: &Session,
        user_id: &str,
        user_risk: &UserRiskState,
        proposed_stake: Decimal,
    ) -> RiskCheck {
        let reason = self.first_rejection(signal, session, user_risk, proposed_stake);
        let check = RiskCheck {
            user_id: user_id.to_string(),
            session_id: session.id.clone(),
            result: if reason.is_none() {
                RiskVerdict::Approved
            } else {
                RiskVerdict::Rejected
            },
            reason,
            proposed_trade: signal.clone(),
            stake: proposed_stake,
            memory_id: None,
        };

        if let Some(reason) = reason {
            debug!(user_id, session_id = %session.id, %reason, "risk check rejected");
        }
        self.events
            .publish(PipelineEvent::RiskCheckCompleted(check.clone()));
        check
    }

    fn first_rejection(
        &self,
        signal: &Signal,
        session: &Session,
        user_risk: &UserRiskState,
        proposed_stake: Decimal,
    ) -> Option<RejectReason> {
        // Priority 1: user gate.
        if user_risk.is_opted_out {
            return Some(RejectReason::UserOptedOut);
        }
        if user_risk.current_drawdown >= user_risk.max_drawdown {
            return Some(RejectReason::UserMaxDrawdownReached);
        }
        if user_risk.current_daily_loss >= user_risk.max_daily_loss {
            return Some(RejectReason::UserDailyLossLimit);
        }
        if user_risk.trades_today >= user_risk.max_trades_per_session {
            return Some(RejectReason::UserMaxTradesReached);
        }

        // Priority 2: session gate.
        if session.config.is_paused {
            return Some(RejectReason::SessionPaused);
        }
        if session.current_pnl <= -session.config.global_loss_threshold {
            return Some(RejectReason::SessionLossThreshold);
        }

        // Priority 3: signal gate.
        if !session.config.allows_market(&signal.market) {
            return Some(RejectReason::MarketNotAllowed);
        }
        let profile = self.profiles.params(session.config.risk_profile);
        let floor = session.config.min_confidence.max(profile.min_confidence);
        if signal.confidence < floor {
            return Some(RejectReason::MinConfidenceNotMet);
        }

        // Priority 4: stake gate.
        if proposed_stake > session.config.max_stake * profile.stake_multiplier {
            return Some(RejectReason::SessionMaxStakeExceeded);
        }

        None
    }

    pub fn profiles(&self) -> &RiskProfileTable {
        &self.profiles
    }
}
