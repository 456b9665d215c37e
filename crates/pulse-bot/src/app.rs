//! Application wiring and lifecycle.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::orchestrator::Orchestrator;
use pulse_core::{EventBus, PipelineEvent};
use pulse_executor::{TradeExecutor, WsSessionFactory};
use pulse_feed::{FeedEvent, MarketDataAdapter};
use pulse_persistence::{CredentialSource, DurableStore, InMemoryCredentials, InMemoryStore};
use pulse_registry::SessionRegistry;
use pulse_risk::{InMemoryUserRisk, RiskGuard, UserRiskSource};
use pulse_signal::{SignalEngine, SignalEngineConfig};
use pulse_telemetry::metrics;
use pulse_ws::{BrokerClient, BrokerEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The assembled pipeline.
///
/// Deployments swap the in-memory externals (durable store, credentials,
/// idempotency KV) for real drivers at the `new_with_stores` seam; the
/// core wiring is identical either way.
pub struct Application {
    config: AppConfig,
    bus: EventBus,
    adapter: Arc<MarketDataAdapter>,
    registry: Arc<SessionRegistry>,
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn DurableStore>,
    ticker: BrokerClient,
    broker_events: Option<mpsc::Receiver<BrokerEvent>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let store: Arc<dyn DurableStore> = Arc::new(InMemoryStore::new());
        let credentials: Arc<dyn CredentialSource> = Arc::new(InMemoryCredentials::new());
        Self::new_with_stores(config, store, credentials, None)
    }

    pub fn new_with_stores(
        config: AppConfig,
        store: Arc<dyn DurableStore>,
        credentials: Arc<dyn CredentialSource>,
        kv: Option<Arc<dyn pulse_persistence::IdempotencyKv>>,
    ) -> AppResult<Self> {
        config.validate()?;

        let bus = EventBus::new(1024);
        let risk_source: Arc<dyn UserRiskSource> = Arc::new(InMemoryUserRisk::new());

        let adapter = Arc::new(MarketDataAdapter::new(config.feed_config()));
        let engine = Arc::new(SignalEngine::new(SignalEngineConfig::default(), bus.clone()));
        let guard = Arc::new(RiskGuard::new(config.profile_table(), bus.clone()));
        let registry = Arc::new(SessionRegistry::new(
            config.registry_config(),
            Some(store.clone()),
            bus.clone(),
        ));

        let executor_config = config.executor_config();
        let base_stake = executor_config.stake.base;
        let factory = Arc::new(WsSessionFactory::new(config.broker_config()));
        let executor = Arc::new(TradeExecutor::new(
            executor_config,
            factory,
            credentials,
            store.clone(),
            kv,
            None,
            bus.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            engine,
            guard,
            registry.clone(),
            executor,
            risk_source,
            base_stake,
        ));

        let (event_tx, event_rx) = mpsc::channel(1024);
        let ticker = BrokerClient::new(config.broker_config(), event_tx);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            adapter,
            registry,
            orchestrator,
            store,
            ticker,
            broker_events: Some(event_rx),
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Subscribe to the pipeline event surface (external fan-out).
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.bus.subscribe()
    }

    /// Rebuild session state from the durable store.
    pub async fn recover(&self) -> AppResult<usize> {
        Ok(self.registry.recover(self.store.as_ref()).await?)
    }

    /// Spawn the long-lived workers and wire the streams together.
    pub async fn start(&mut self) {
        let shutdown_rx = self.shutdown_tx.subscribe();

        // Seed the subscription table; sends fail while disconnected and
        // the connect path re-subscribes everything in the table.
        for market in &self.config.markets {
            if let Err(e) = self.ticker.subscribe_ticks(market) {
                debug!(market = %market, error = %e, "subscription queued until connect");
            }
        }

        // Ticker supervisor: connect, reconnect, circuit breaker.
        let ticker = self.ticker.clone();
        let ticker_shutdown = shutdown_rx.clone();
        self.tasks.push(tokio::spawn(async move {
            ticker.run(ticker_shutdown).await;
        }));

        // Broker event pump: ticks into the feed, health into metrics.
        let mut broker_events = self.broker_events.take().expect("application started twice");
        let adapter = Arc::clone(&self.adapter);
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = broker_events.recv().await {
                match event {
                    BrokerEvent::Connected => metrics::WS_CONNECTED.set(1.0),
                    BrokerEvent::Disconnected { reason } => {
                        metrics::WS_CONNECTED.set(0.0);
                        warn!(%reason, "ticker disconnected");
                    }
                    BrokerEvent::Tick(tick) => adapter.ingest(tick),
                    BrokerEvent::Settled(settlement) => {
                        // Per-order clients own their settlements; the
                        // shared ticker only logs strays.
                        debug!(contract_id = %settlement.contract_id, "stray settlement on ticker");
                    }
                    BrokerEvent::HeartbeatLatency { latency_ms } => {
                        metrics::HEARTBEAT_RTT_MS.observe(latency_ms as f64);
                    }
                    BrokerEvent::CircuitBreakerOpened { reason } => {
                        metrics::CIRCUIT_OPENED_TOTAL.inc();
                        warn!(%reason, "circuit breaker opened");
                    }
                    BrokerEvent::Error { code, message } => {
                        warn!(%code, %message, "unroutable broker error");
                    }
                }
            }
        }));

        // Cooperative drainer.
        self.tasks
            .push(self.adapter.spawn_drainer(shutdown_rx.clone()));

        // Feed consumer: ready ticks into the orchestrator.
        let mut feed_rx = self.adapter.subscribe();
        let orchestrator = Arc::clone(&self.orchestrator);
        let mut feed_shutdown = shutdown_rx.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = feed_rx.recv() => match event {
                        Ok(FeedEvent::TickReady(tick)) => orchestrator.on_tick(&tick).await,
                        Ok(FeedEvent::QueueOverflow { dropped }) => {
                            metrics::TICKS_DROPPED_TOTAL
                                .with_label_values(&["overflow"])
                                .inc_by(dropped as f64);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(lagged = n, "feed consumer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = feed_shutdown.changed() => {
                        if *feed_shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }));

        // Bus listener: settlement feedback plus event metrics.
        let mut bus_rx = self.bus.subscribe();
        let orchestrator = Arc::clone(&self.orchestrator);
        let mut bus_shutdown = shutdown_rx;
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = bus_rx.recv() => match event {
                        Ok(PipelineEvent::TradeSettled(trade)) => {
                            metrics::TRADES_TOTAL
                                .with_label_values(&[&trade.status.to_string()])
                                .inc();
                            orchestrator.on_trade_settled(&trade).await;
                        }
                        Ok(PipelineEvent::TradeExecuted(trade)) => {
                            metrics::TRADES_TOTAL
                                .with_label_values(&[&trade.status.to_string()])
                                .inc();
                        }
                        Ok(PipelineEvent::SignalEmitted(signal)) => {
                            metrics::SIGNALS_TOTAL
                                .with_label_values(&[&signal.market, &signal.kind.to_string()])
                                .inc();
                        }
                        Ok(PipelineEvent::RiskCheckCompleted(check)) => {
                            let reason = check
                                .reason
                                .map(|r| r.to_string())
                                .unwrap_or_else(|| "NONE".to_string());
                            metrics::RISK_CHECKS_TOTAL
                                .with_label_values(&[
                                    &format!("{:?}", check.result).to_uppercase(),
                                    &reason,
                                ])
                                .inc();
                        }
                        Ok(PipelineEvent::SessionStatusUpdate { .. }) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(lagged = n, "bus listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = bus_shutdown.changed() => {
                        if *bus_shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }));

        info!(markets = self.config.markets.len(), "application started");
    }

    /// Start, then run until interrupted.
    pub async fn run(&mut self) -> AppResult<()> {
        self.start().await;
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Stop workers, detach stream subscriptions, drop buffered ticks,
    /// close the ticker.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.ticker.disconnect().await;
        self.adapter.drop_queue();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("application stopped");
    }
}
