//! Auto-trading orchestrator.
//!
//! The thin layer that subscribes component outputs to component inputs:
//! ready ticks feed the signal engine, signals fan out per participant of
//! every RUNNING session that trades the market, approvals go to the
//! executor, settlements flow back into registry PnL, user risk counters
//! and the engine's win-rate history.

use pulse_core::{Signal, Tick, TradeResult, TradeStatus};
use pulse_executor::TradeExecutor;
use pulse_registry::SessionRegistry;
use pulse_risk::{recommended_stake, RiskGuard, UserRiskSource};
use pulse_signal::SignalEngine;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Orchestrator {
    engine: Arc<SignalEngine>,
    guard: Arc<RiskGuard>,
    registry: Arc<SessionRegistry>,
    executor: Arc<TradeExecutor>,
    risk_source: Arc<dyn UserRiskSource>,
    /// Base stake the per-user recommendation starts from.
    base_stake: Decimal,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<SignalEngine>,
        guard: Arc<RiskGuard>,
        registry: Arc<SessionRegistry>,
        executor: Arc<TradeExecutor>,
        risk_source: Arc<dyn UserRiskSource>,
        base_stake: Decimal,
    ) -> Self {
        Self {
            engine,
            guard,
            registry,
            executor,
            risk_source,
            base_stake,
        }
    }

    /// One ready tick, end to end.
    pub async fn on_tick(&self, tick: &Tick) {
        let Some(signal) = self.engine.process_tick(tick, None) else {
            return;
        };
        self.dispatch_signal(&signal).await;
    }

    /// Fan a signal out: per RUNNING session trading the market (registry
    /// order), per active participant (join order). Each approval is
    /// handed to an executor task; the guard emits the check events in
    /// this loop's deterministic order.
    pub async fn dispatch_signal(&self, signal: &Signal) {
        for session in self.registry.sessions_for_market(&signal.market) {
            let participants: Vec<_> = session.active_participants().cloned().collect();
            if participants.is_empty() {
                // Nothing to evaluate.
                debug!(session_id = %session.id, "session has no active participants");
                continue;
            }

            for participant in participants {
                let user_risk = self
                    .risk_source
                    .risk_state(&participant.user_id)
                    .unwrap_or_default();
                let profile = self.guard.profiles().params(session.config.risk_profile);
                let stake = recommended_stake(self.base_stake, &profile, &user_risk);

                let check =
                    self.guard
                        .validate(signal, &session, &participant.user_id, &user_risk, stake);
                if check.is_approved() {
                    self.risk_source.record_trade(&participant.user_id);
                    let executor = Arc::clone(&self.executor);
                    // Execution blocks on settlement for up to five
                    // minutes; it must not hold up the tick loop.
                    tokio::spawn(async move {
                        executor.handle_risk_check(&check).await;
                    });
                }
            }
        }
    }

    /// Settlement feedback into the stateful components.
    pub async fn on_trade_settled(&self, trade: &TradeResult) {
        if let Err(e) = self
            .registry
            .update_pnl(&trade.session_id, &trade.user_id, trade.pnl)
            .await
        {
            warn!(session_id = %trade.session_id, user_id = %trade.user_id, error = %e,
                  "pnl update failed");
        }
        self.risk_source.apply_outcome(&trade.user_id, trade.pnl);
        self.engine
            .record_outcome(&trade.metadata.market, trade.status == TradeStatus::Won);
    }
}
