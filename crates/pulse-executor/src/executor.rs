//! The trade executor.
//!
//! Lifecycle per approved check: idempotency claim, credential lookup,
//! fresh broker session, authorize, propose, buy, persist OPEN row, emit
//! TRADE_EXECUTED, settlement wait, persist outcome, emit TRADE_SETTLED.
//! The broker session is disconnected on every exit path. A settlement
//! deadline leaves the row OPEN for the external reconciler.

use crate::broker::{BrokerSession, BrokerSessionFactory};
use crate::duration::duration_for_market_or;
use crate::error::{ExecError, ExecResult};
use crate::idempotency::{idempotency_key, IdempotencyGate};
use crate::memory::MemoryCapture;
use crate::stake::StakePolicy;
use chrono::Utc;
use pulse_core::{
    ContractDuration, EventBus, PipelineEvent, RiskCheck, RiskVerdict, SettlementOutcome, Signal,
    TradeMetadata, TradeResult, TradeStatus,
};
use pulse_persistence::{CredentialSource, DurableStore, IdempotencyKv, TradeRow};
use pulse_ws::ProposeParams;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Account currency used when the credential source has no active
    /// account for the user.
    pub currency: String,
    pub stake: StakePolicy,
    /// Fallback duration for markets outside the heuristic classes.
    pub default_duration: ContractDuration,
    pub settlement_timeout: Duration,
    pub idempotency_ttl: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            stake: StakePolicy::default(),
            default_duration: ContractDuration::minutes(3),
            settlement_timeout: Duration::from_secs(300),
            idempotency_ttl: Duration::from_secs(3600),
        }
    }
}

/// The execution core.
pub struct TradeExecutor {
    config: ExecutorConfig,
    factory: Arc<dyn BrokerSessionFactory>,
    credentials: Arc<dyn CredentialSource>,
    store: Arc<dyn DurableStore>,
    gate: IdempotencyGate,
    memory: Option<Arc<dyn MemoryCapture>>,
    events: EventBus,
}

impl TradeExecutor {
    pub fn new(
        config: ExecutorConfig,
        factory: Arc<dyn BrokerSessionFactory>,
        credentials: Arc<dyn CredentialSource>,
        store: Arc<dyn DurableStore>,
        kv: Option<Arc<dyn IdempotencyKv>>,
        memory: Option<Arc<dyn MemoryCapture>>,
        events: EventBus,
    ) -> Self {
        let gate = IdempotencyGate::new(kv, config.idempotency_ttl);
        Self {
            config,
            factory,
            credentials,
            store,
            gate,
            memory,
            events,
        }
    }

    /// Entry point wired to `risk_check_completed`. Rejections are not
    /// this component's business.
    pub async fn handle_risk_check(&self, check: &RiskCheck) {
        if !check.is_approved() {
            return;
        }
        self.execute(check).await;
    }

    /// Manual trade entry: bypasses the risk guard but reuses the exact
    /// lifecycle, idempotency included.
    pub async fn manual_trade(
        &self,
        user_id: &str,
        session_id: &str,
        signal: Signal,
        stake: Decimal,
    ) {
        let check = RiskCheck {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            result: RiskVerdict::Approved,
            reason: None,
            proposed_trade: signal,
            stake,
            memory_id: None,
        };
        self.execute(&check).await;
    }

    async fn execute(&self, check: &RiskCheck) {
        let signal = &check.proposed_trade;
        let key = idempotency_key(&check.user_id, &signal.market, signal.timestamp);
        if !self.gate.try_acquire(&key).await {
            debug!(key = %key, "duplicate approval silently dropped");
            return;
        }

        let trade_id = Uuid::new_v4().to_string();

        let Some(token) = self.credentials.get_token(&check.user_id).await else {
            self.emit_failed(check, &trade_id, &ExecError::MissingToken(check.user_id.clone()))
                .await;
            return;
        };
        let currency = self
            .credentials
            .get_active_account(&check.user_id)
            .await
            .map(|account| account.currency)
            .unwrap_or_else(|| self.config.currency.clone());

        let session = match self.factory.open().await {
            Ok(session) => session,
            Err(e) => {
                self.emit_failed(check, &trade_id, &ExecError::Ws(e)).await;
                return;
            }
        };

        // From here on the session is released on every path.
        match self
            .submit(session.as_ref(), check, &trade_id, &token, &currency)
            .await
        {
            Ok(submitted) => self.settle(session.as_ref(), submitted, check).await,
            Err(e) => self.emit_failed(check, &trade_id, &e).await,
        }
        session.disconnect().await;
    }

    async fn submit(
        &self,
        session: &dyn BrokerSession,
        check: &RiskCheck,
        trade_id: &str,
        token: &str,
        currency: &str,
    ) -> ExecResult<TradeResult> {
        let signal = &check.proposed_trade;
        session.authorize(token).await?;

        let stake = if check.stake > Decimal::ZERO {
            self.config.stake.clamp(check.stake)
        } else {
            self.config.stake.stake_for(Some(signal.confidence))
        };
        let duration = signal.duration.unwrap_or_else(|| {
            duration_for_market_or(&signal.market, self.config.default_duration)
        });
        let proposal = session
            .propose(&ProposeParams {
                symbol: signal.market.clone(),
                contract_type: signal.kind,
                stake,
                currency: currency.to_string(),
                duration,
            })
            .await?;
        let confirmation = session.buy(&proposal.proposal_id, proposal.ask_price).await?;

        let result = TradeResult {
            trade_id: trade_id.to_string(),
            user_id: check.user_id.clone(),
            session_id: check.session_id.clone(),
            status: TradeStatus::Submitted,
            pnl: Decimal::ZERO,
            executed_at: Utc::now(),
            settled_at: None,
            metadata: TradeMetadata {
                market: signal.market.clone(),
                entry_price: Some(confirmation.buy_price),
                contract_id: Some(confirmation.contract_id.clone()),
                broker_ref: Some(confirmation.transaction_id.to_string()),
                risk_confidence: signal.confidence,
                failure_reason: None,
            },
        };

        let row = TradeRow {
            trade_id: trade_id.to_string(),
            user_id: check.user_id.clone(),
            session_id: check.session_id.clone(),
            market: signal.market.clone(),
            status: "OPEN".to_string(),
            stake,
            entry_price: result.metadata.entry_price,
            exit_price: None,
            pnl: Decimal::ZERO,
            contract_id: result.metadata.contract_id.clone(),
            broker_ref: result.metadata.broker_ref.clone(),
            executed_at: result.executed_at,
            settled_at: None,
        };
        if let Err(e) = self.store.insert_trade(&row).await {
            // Persistence trouble must not abort a live order.
            warn!(trade_id, error = %e, "trade row insert failed");
        }

        info!(trade_id, market = %signal.market, %stake, "trade submitted");
        self.events
            .publish(PipelineEvent::TradeExecuted(result.clone()));
        self.capture(&result);
        Ok(result)
    }

    async fn settle(&self, session: &dyn BrokerSession, mut trade: TradeResult, check: &RiskCheck) {
        let Some(contract_id) = trade.metadata.contract_id.clone() else {
            return;
        };
        match session
            .wait_settlement(&contract_id, self.config.settlement_timeout)
            .await
        {
            Ok(Some(settlement)) => {
                trade.status = match settlement.outcome {
                    SettlementOutcome::Win => TradeStatus::Won,
                    SettlementOutcome::Loss => TradeStatus::Lost,
                };
                trade.pnl = settlement.pnl;
                trade.settled_at = Some(Utc::now());

                if let Err(e) = self
                    .store
                    .settle_trade(
                        &trade.trade_id,
                        &trade.status.to_string(),
                        trade.pnl,
                        None,
                        trade.settled_at.expect("just set"),
                    )
                    .await
                {
                    warn!(trade_id = %trade.trade_id, error = %e, "trade settle update failed");
                }

                info!(trade_id = %trade.trade_id, status = %trade.status, pnl = %trade.pnl, "trade settled");
                self.events
                    .publish(PipelineEvent::TradeSettled(trade.clone()));
                if let Some(memory_id) = &check.memory_id {
                    self.record_memory_outcome(memory_id, trade.status);
                }
            }
            Ok(None) => {
                // The reconciler picks the OPEN row up later.
                warn!(contract_id = %contract_id, trade_id = %trade.trade_id,
                      "settlement deadline passed, row stays OPEN");
            }
            Err(e) => {
                warn!(contract_id = %contract_id, trade_id = %trade.trade_id, error = %e,
                      "settlement wait failed");
            }
        }
    }

    async fn emit_failed(&self, check: &RiskCheck, trade_id: &str, error: &ExecError) {
        let code = error.failure_code();
        warn!(trade_id, user_id = %check.user_id, %error, code = %code, "trade failed");

        let result = TradeResult {
            trade_id: trade_id.to_string(),
            user_id: check.user_id.clone(),
            session_id: check.session_id.clone(),
            status: TradeStatus::Failed,
            pnl: Decimal::ZERO,
            executed_at: Utc::now(),
            settled_at: None,
            metadata: TradeMetadata {
                market: check.proposed_trade.market.clone(),
                entry_price: None,
                contract_id: None,
                broker_ref: None,
                risk_confidence: check.proposed_trade.confidence,
                failure_reason: Some(code),
            },
        };
        self.events
            .publish(PipelineEvent::TradeExecuted(result));
        if let Some(memory_id) = &check.memory_id {
            self.record_memory_outcome(memory_id, TradeStatus::Failed);
        }
    }

    fn capture(&self, result: &TradeResult) {
        let Some(memory) = &self.memory else { return };
        if let Err(e) = memory.capture(result) {
            warn!(trade_id = %result.trade_id, error = %e, "memory capture failed");
        }
    }

    fn record_memory_outcome(&self, memory_id: &str, status: TradeStatus) {
        let Some(memory) = &self.memory else { return };
        if let Err(e) = memory.record_outcome(memory_id, status) {
            warn!(memory_id, error = %e, "memory outcome update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerSession;
    use crate::memory::MemoryError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pulse_core::SignalKind;
    use pulse_persistence::{InMemoryCredentials, InMemoryKv, InMemoryStore};
    use pulse_ws::{BrokerErrorCode, BuyConfirmation, Proposal, Settlement, WsError};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast::Receiver;

    struct QueueFactory {
        sessions: Mutex<Vec<Box<dyn BrokerSession>>>,
        opens: AtomicUsize,
    }

    impl QueueFactory {
        fn with(sessions: Vec<Box<dyn BrokerSession>>) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(sessions),
                opens: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BrokerSessionFactory for QueueFactory {
        async fn open(&self) -> Result<Box<dyn BrokerSession>, WsError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.sessions
                .lock()
                .pop()
                .ok_or_else(|| WsError::ConnectionFailed("no session queued".to_string()))
        }
    }

    struct FailingMemory;

    impl MemoryCapture for FailingMemory {
        fn capture(&self, _result: &TradeResult) -> Result<(), MemoryError> {
            Err(MemoryError("capture store offline".to_string()))
        }
        fn record_outcome(&self, _memory_id: &str, _status: TradeStatus) -> Result<(), MemoryError> {
            Err(MemoryError("capture store offline".to_string()))
        }
    }

    fn approved_check() -> RiskCheck {
        RiskCheck {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            result: RiskVerdict::Approved,
            reason: None,
            proposed_trade: Signal::new(SignalKind::Call, "R_100", 0.8, "test"),
            stake: dec!(10),
            memory_id: None,
        }
    }

    fn happy_session(outcome: Option<SettlementOutcome>) -> MockBrokerSession {
        let mut session = MockBrokerSession::new();
        session.expect_authorize().times(1).returning(|_| Ok(()));
        session.expect_propose().times(1).returning(|_| {
            Ok(Proposal {
                proposal_id: "p-1".to_string(),
                ask_price: dec!(10.00),
                payout: dec!(19.50),
                longcode: None,
            })
        });
        session.expect_buy().times(1).returning(|_, _| {
            Ok(BuyConfirmation {
                contract_id: "c-1".to_string(),
                buy_price: dec!(10.00),
                transaction_id: 42,
                payout: dec!(19.50),
                start_time: None,
            })
        });
        session
            .expect_wait_settlement()
            .times(1)
            .returning(move |contract_id, _| {
                Ok(outcome.map(|o| Settlement {
                    contract_id: contract_id.to_string(),
                    outcome: o,
                    pnl: match o {
                        SettlementOutcome::Win => dec!(9.50),
                        SettlementOutcome::Loss => dec!(-10.00),
                    },
                }))
            });
        session.expect_disconnect().times(1).return_const(());
        session
    }

    struct Harness {
        executor: TradeExecutor,
        factory: Arc<QueueFactory>,
        store: Arc<InMemoryStore>,
        events: Receiver<PipelineEvent>,
    }

    fn harness(
        sessions: Vec<Box<dyn BrokerSession>>,
        memory: Option<Arc<dyn MemoryCapture>>,
        link_token: bool,
    ) -> Harness {
        let factory = QueueFactory::with(sessions);
        let store = Arc::new(InMemoryStore::new());
        let credentials = Arc::new(InMemoryCredentials::new());
        if link_token {
            credentials.link("u1", "token-abc", Vec::new());
        }
        let bus = EventBus::new(64);
        let events = bus.subscribe();
        let executor = TradeExecutor::new(
            ExecutorConfig::default(),
            factory.clone(),
            credentials,
            store.clone(),
            Some(Arc::new(InMemoryKv::new())),
            memory,
            bus,
        );
        Harness {
            executor,
            factory,
            store,
            events,
        }
    }

    fn collect(events: &mut Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_full_lifecycle_win() {
        let mut h = harness(
            vec![Box::new(happy_session(Some(SettlementOutcome::Win)))],
            None,
            true,
        );
        h.executor.handle_risk_check(&approved_check()).await;

        let events = collect(&mut h.events);
        let submitted: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::TradeExecuted(t) => Some(t),
                _ => None,
            })
            .collect();
        let settled: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::TradeSettled(t) => Some(t),
                _ => None,
            })
            .collect();

        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].status, TradeStatus::Submitted);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].status, TradeStatus::Won);
        assert_eq!(settled[0].pnl, dec!(9.50));

        let row = h.store.trade(&submitted[0].trade_id).unwrap();
        assert_eq!(row.status, "WON");
        assert_eq!(row.pnl, dec!(9.50));
        assert!(row.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_approval_executes_once() {
        let mut h = harness(
            vec![Box::new(happy_session(Some(SettlementOutcome::Win)))],
            None,
            true,
        );
        let check = approved_check();
        h.executor.handle_risk_check(&check).await;
        h.executor.handle_risk_check(&check).await;

        assert_eq!(h.factory.opens.load(Ordering::SeqCst), 1);
        let executed = collect(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, PipelineEvent::TradeExecuted(_)))
            .count();
        assert_eq!(executed, 1);
        assert_eq!(h.store.trade_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_check_is_ignored() {
        let mut h = harness(Vec::new(), None, true);
        let mut check = approved_check();
        check.result = RiskVerdict::Rejected;
        h.executor.handle_risk_check(&check).await;

        assert_eq!(h.factory.opens.load(Ordering::SeqCst), 0);
        assert!(collect(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_broker_contact() {
        let mut h = harness(Vec::new(), None, false);
        h.executor.handle_risk_check(&approved_check()).await;

        assert_eq!(h.factory.opens.load(Ordering::SeqCst), 0);
        let events = collect(&mut h.events);
        match &events[..] {
            [PipelineEvent::TradeExecuted(t)] => {
                assert_eq!(t.status, TradeStatus::Failed);
                assert_eq!(t.metadata.failure_reason.as_deref(), Some("AUTHENTICATION"));
                assert_eq!(t.pnl, dec!(0));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buy_rejection_maps_broker_code() {
        let mut session = MockBrokerSession::new();
        session.expect_authorize().returning(|_| Ok(()));
        session.expect_propose().returning(|_| {
            Ok(Proposal {
                proposal_id: "p-1".to_string(),
                ask_price: dec!(10.00),
                payout: dec!(19.50),
                longcode: None,
            })
        });
        session.expect_buy().returning(|_, _| {
            Err(WsError::Broker {
                code: BrokerErrorCode::InsufficientBalance,
                message: "balance too low".to_string(),
            })
        });
        // Disconnect must run on the failure path too.
        session.expect_disconnect().times(1).return_const(());

        let mut h = harness(vec![Box::new(session)], None, true);
        h.executor.handle_risk_check(&approved_check()).await;

        let events = collect(&mut h.events);
        match &events[..] {
            [PipelineEvent::TradeExecuted(t)] => {
                assert_eq!(t.status, TradeStatus::Failed);
                assert_eq!(
                    t.metadata.failure_reason.as_deref(),
                    Some("INSUFFICIENT_BALANCE")
                );
            }
            other => panic!("unexpected events: {other:?}"),
        }
        // Nothing persisted before buy succeeded.
        assert_eq!(h.store.trade_count(), 0);
    }

    #[tokio::test]
    async fn test_settlement_timeout_leaves_row_open() {
        let mut h = harness(vec![Box::new(happy_session(None))], None, true);
        h.executor.handle_risk_check(&approved_check()).await;

        let events = collect(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TradeExecuted(_))));
        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TradeSettled(_))));

        let submitted = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::TradeExecuted(t) => Some(t.trade_id.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(h.store.trade(&submitted).unwrap().status, "OPEN");
    }

    #[tokio::test]
    async fn test_memory_failure_does_not_abort_flow() {
        let mut h = harness(
            vec![Box::new(happy_session(Some(SettlementOutcome::Loss)))],
            Some(Arc::new(FailingMemory)),
            true,
        );
        let mut check = approved_check();
        check.memory_id = Some("mem-1".to_string());
        h.executor.handle_risk_check(&check).await;

        let events = collect(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TradeExecuted(_))));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TradeSettled(t) if t.status == TradeStatus::Lost)));
    }

    #[tokio::test]
    async fn test_manual_trade_reuses_lifecycle_and_idempotency() {
        let mut h = harness(
            vec![Box::new(happy_session(Some(SettlementOutcome::Win)))],
            None,
            true,
        );
        let signal = Signal::new(SignalKind::Put, "frxEURUSD", 0.9, "manual");
        h.executor
            .manual_trade("u1", "s1", signal.clone(), dec!(25))
            .await;
        h.executor.manual_trade("u1", "s1", signal, dec!(25)).await;

        assert_eq!(h.factory.opens.load(Ordering::SeqCst), 1);
        let events = collect(&mut h.events);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, PipelineEvent::TradeExecuted(_)))
                .count(),
            1
        );
    }
}
