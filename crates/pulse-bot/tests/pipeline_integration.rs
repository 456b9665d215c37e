//! Cross-component integration: signal fan-out through the risk guard
//! into the executor, with a stubbed broker.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pulse_bot::Orchestrator;
use pulse_core::{
    EventBus, PipelineEvent, RejectReason, RiskVerdict, SessionConfig, SessionStatus,
    SettlementOutcome, Signal, SignalKind,
};
use pulse_executor::{BrokerSession, BrokerSessionFactory, ExecutorConfig, TradeExecutor};
use pulse_persistence::{InMemoryCredentials, InMemoryStore};
use pulse_registry::{RegistryConfig, SessionRegistry};
use pulse_risk::{InMemoryUserRisk, RiskGuard, RiskProfileTable, UserRiskSource};
use pulse_signal::{SignalEngine, SignalEngineConfig};
use pulse_ws::{BuyConfirmation, Proposal, ProposeParams, Settlement, WsError, WsResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

struct StubSession;

#[async_trait]
impl BrokerSession for StubSession {
    async fn authorize(&self, _token: &str) -> WsResult<()> {
        Ok(())
    }

    async fn propose(&self, _params: &ProposeParams) -> WsResult<Proposal> {
        Ok(Proposal {
            proposal_id: "p-1".to_string(),
            ask_price: dec!(10.00),
            payout: dec!(19.50),
            longcode: None,
        })
    }

    async fn buy(&self, _proposal_id: &str, _max_price: Decimal) -> WsResult<BuyConfirmation> {
        Ok(BuyConfirmation {
            contract_id: "c-1".to_string(),
            buy_price: dec!(10.00),
            transaction_id: 7,
            payout: dec!(19.50),
            start_time: None,
        })
    }

    async fn wait_settlement(
        &self,
        contract_id: &str,
        _timeout: Duration,
    ) -> WsResult<Option<Settlement>> {
        Ok(Some(Settlement {
            contract_id: contract_id.to_string(),
            outcome: SettlementOutcome::Win,
            pnl: dec!(9.50),
        }))
    }

    async fn disconnect(&self) {}
}

struct StubFactory {
    opens: AtomicUsize,
}

#[async_trait]
impl BrokerSessionFactory for StubFactory {
    async fn open(&self) -> Result<Box<dyn BrokerSession>, WsError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession))
    }
}

struct Pipeline {
    orchestrator: Orchestrator,
    registry: Arc<SessionRegistry>,
    factory: Arc<StubFactory>,
    events: Receiver<PipelineEvent>,
}

fn pipeline(users: &[&str]) -> Pipeline {
    let bus = EventBus::new(256);
    let events = bus.subscribe();

    let registry = Arc::new(SessionRegistry::new(
        RegistryConfig::default(),
        None,
        bus.clone(),
    ));
    let engine = Arc::new(SignalEngine::new(SignalEngineConfig::default(), bus.clone()));
    let guard = Arc::new(RiskGuard::new(RiskProfileTable::default(), bus.clone()));

    let credentials = Arc::new(InMemoryCredentials::new());
    for user in users {
        credentials.link(*user, format!("token-{user}"), Vec::new());
    }
    let risk_source: Arc<dyn UserRiskSource> = Arc::new(InMemoryUserRisk::new());
    let factory = Arc::new(StubFactory {
        opens: AtomicUsize::new(0),
    });
    let executor = Arc::new(TradeExecutor::new(
        ExecutorConfig::default(),
        factory.clone(),
        credentials,
        Arc::new(InMemoryStore::new()),
        None,
        None,
        bus.clone(),
    ));

    let orchestrator = Orchestrator::new(
        engine,
        guard,
        registry.clone(),
        executor,
        risk_source,
        dec!(10),
    );
    Pipeline {
        orchestrator,
        registry,
        factory,
        events,
    }
}

fn signal_at(second: i64) -> Signal {
    let mut signal = Signal::new(SignalKind::Call, "R_100", 0.9, "integration");
    signal.timestamp = Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap();
    signal
}

fn collect(events: &mut Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

async fn running_session(p: &Pipeline, markets: &[&str], users: &[&str]) -> String {
    let mut config = SessionConfig::default();
    for market in markets {
        config.allowed_markets.insert((*market).to_string());
    }
    let session = p.registry.create_session(config, "admin").await;
    for user in users {
        p.registry.add_participant(&session.id, user).await.unwrap();
    }
    p.registry
        .transition(&session.id, SessionStatus::Active)
        .await
        .unwrap();
    p.registry
        .transition(&session.id, SessionStatus::Running)
        .await
        .unwrap();
    session.id
}

#[tokio::test]
async fn test_fan_out_order_and_execution() {
    let mut p = pipeline(&["u1", "u2"]);
    running_session(&p, &["R_100"], &["u1", "u2"]).await;

    p.orchestrator.dispatch_signal(&signal_at(0)).await;
    // Let the spawned execution tasks run to settlement.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = collect(&mut p.events);
    let checks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::RiskCheckCompleted(c) => Some(c),
            _ => None,
        })
        .collect();
    // One check per participant, in join order, all approved.
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0].user_id, "u1");
    assert_eq!(checks[1].user_id, "u2");
    assert!(checks.iter().all(|c| c.result == RiskVerdict::Approved));

    assert_eq!(p.factory.opens.load(Ordering::SeqCst), 2);
    let executed = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::TradeExecuted(_)))
        .count();
    let settled = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::TradeSettled(_)))
        .count();
    assert_eq!(executed, 2);
    assert_eq!(settled, 2);
}

#[tokio::test]
async fn test_market_pause_gates_risk_until_resume() {
    let mut p = pipeline(&["u1"]);
    let session_id = running_session(&p, &["R_100"], &["u1"]).await;

    let paused = p.registry.pause_sessions_by_market("R_100").await;
    assert_eq!(paused, vec![session_id.clone()]);

    p.orchestrator.dispatch_signal(&signal_at(0)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = collect(&mut p.events);
    let rejected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::RiskCheckCompleted(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].reason, Some(RejectReason::SessionPaused));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::TradeExecuted(_))));
    assert_eq!(p.factory.opens.load(Ordering::SeqCst), 0);

    // Resume restores the session to RUNNING and trades flow again.
    let resumed = p.registry.resume_sessions_by_market("R_100").await;
    assert_eq!(resumed, vec![session_id.clone()]);
    assert_eq!(
        p.registry.get(&session_id).unwrap().status,
        SessionStatus::Running
    );

    p.orchestrator.dispatch_signal(&signal_at(60)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = collect(&mut p.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::TradeExecuted(_))));
    assert_eq!(p.factory.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_session_without_participants_is_skipped() {
    let mut p = pipeline(&[]);
    running_session(&p, &["R_100"], &[]).await;

    p.orchestrator.dispatch_signal(&signal_at(0)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = collect(&mut p.events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::RiskCheckCompleted(_))));
}

#[tokio::test]
async fn test_settlement_feedback_updates_pnl() {
    let mut p = pipeline(&["u1"]);
    let session_id = running_session(&p, &["R_100"], &["u1"]).await;

    p.orchestrator.dispatch_signal(&signal_at(0)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = collect(&mut p.events);
    let settled = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::TradeSettled(t) => Some(t.clone()),
            _ => None,
        })
        .expect("trade should settle");
    p.orchestrator.on_trade_settled(&settled).await;

    let session = p.registry.get(&session_id).unwrap();
    assert_eq!(session.current_pnl, dec!(9.50));
    assert_eq!(session.participant("u1").unwrap().pnl, dec!(9.50));
}
