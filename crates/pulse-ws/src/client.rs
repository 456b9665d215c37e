//! Broker client: connection lifecycle, correlated requests, tick and
//! settlement streams.
//!
//! One `BrokerClient` owns one logical connection. The shared ticker client
//! runs with reconnect enabled; execution opens a fresh client per order
//! with reconnect disabled so credentials never outlive the order.

use crate::circuit::CircuitBreaker;
use crate::correlation::PendingRequests;
use crate::error::{BrokerErrorCode, WsError, WsResult};
use crate::heartbeat::{HeartbeatManager, HEARTBEAT_CLOSE_CODE};
use crate::message::{
    parse_frame, AuthorizeRequest, BuyPayload, BuyRequest, CancelRequest, ForgetRequest,
    InboundFrame, OpenContractRequest, PingRequest, ProposalPayload, ProposalRequest, SellRequest,
    TicksRequest,
};
use crate::subscription::SubscriptionTable;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use pulse_core::{ContractDuration, SettlementOutcome, SignalKind, Tick};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Upstream WebSocket URL (without the app_id query parameter).
    pub url: String,
    /// Mandatory application id, appended as a query parameter.
    pub app_id: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub circuit_window_ms: u64,
    pub circuit_threshold: usize,
    /// Whether `run` keeps the connection alive. Per-order clients set
    /// this false.
    pub reconnect: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.derivws.com/websockets/v3".to_string(),
            app_id: String::new(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 15_000,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
            circuit_window_ms: 30_000,
            circuit_threshold: 5,
            reconnect: true,
        }
    }
}

impl BrokerConfig {
    /// Full endpoint including the mandatory app_id.
    pub fn endpoint(&self) -> String {
        format!("{}?app_id={}", self.url, self.app_id)
    }

    /// Configuration for a single-order client: same endpoint, no reconnect.
    pub fn for_order(&self) -> Self {
        Self {
            reconnect: false,
            ..self.clone()
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A settled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub contract_id: String,
    pub outcome: SettlementOutcome,
    pub pnl: Decimal,
}

/// Events emitted by the client.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    Connected,
    Disconnected { reason: String },
    Tick(Tick),
    Settled(Settlement),
    HeartbeatLatency { latency_ms: i64 },
    CircuitBreakerOpened { reason: String },
    /// A broker error frame no pending request was waiting for.
    Error { code: BrokerErrorCode, message: String },
}

/// Parameters for a contract proposal.
#[derive(Debug, Clone)]
pub struct ProposeParams {
    pub symbol: String,
    pub contract_type: SignalKind,
    pub stake: Decimal,
    pub currency: String,
    pub duration: ContractDuration,
}

/// A broker quote for a prospective contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub proposal_id: String,
    pub ask_price: Decimal,
    pub payout: Decimal,
    pub longcode: Option<String>,
}

/// A confirmed buy.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyConfirmation {
    pub contract_id: String,
    pub buy_price: Decimal,
    pub transaction_id: u64,
    pub payout: Decimal,
    pub start_time: Option<i64>,
}

/// Exponential backoff: `min(base * 2^(attempt-1), max)`.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay)
}

struct ClientInner {
    config: BrokerConfig,
    state: RwLock<ConnectionState>,
    pending: PendingRequests,
    subscriptions: SubscriptionTable,
    heartbeat: HeartbeatManager,
    circuit: CircuitBreaker,
    event_tx: mpsc::Sender<BrokerEvent>,
    write_tx: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    settlements: Mutex<HashMap<String, oneshot::Sender<Settlement>>>,
    /// Set by `disconnect` so the close is not counted as a failure.
    closing: AtomicBool,
}

/// Broker WebSocket client.
#[derive(Clone)]
pub struct BrokerClient {
    inner: Arc<ClientInner>,
}

impl BrokerClient {
    pub fn new(config: BrokerConfig, event_tx: mpsc::Sender<BrokerEvent>) -> Self {
        let heartbeat =
            HeartbeatManager::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        let circuit = CircuitBreaker::new(
            Duration::from_millis(config.circuit_window_ms),
            config.circuit_threshold,
            Duration::from_millis(config.circuit_window_ms),
        );
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: RwLock::new(ConnectionState::Disconnected),
                pending: PendingRequests::new(),
                subscriptions: SubscriptionTable::new(),
                heartbeat,
                circuit,
                event_tx,
                write_tx: RwLock::new(None),
                settlements: Mutex::new(HashMap::new()),
                closing: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The circuit breaker, exposed for supervision.
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.inner.circuit
    }

    /// Open the connection. Returns a receiver resolving with the close
    /// reason once the session ends.
    pub async fn connect(&self) -> WsResult<oneshot::Receiver<String>> {
        if self.inner.circuit.is_open() {
            return Err(WsError::CircuitOpen);
        }
        if self.inner.config.app_id.is_empty() {
            return Err(WsError::ConnectionFailed("missing broker app_id".to_string()));
        }

        *self.inner.state.write() = ConnectionState::Connecting;
        self.inner.closing.store(false, Ordering::SeqCst);

        let endpoint = self.inner.config.endpoint();
        let connect_timeout = Duration::from_millis(self.inner.config.connect_timeout_ms);
        info!(url = %self.inner.config.url, "connecting to broker");

        let ws = match tokio::time::timeout(connect_timeout, connect_async(&endpoint)).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                *self.inner.state.write() = ConnectionState::Disconnected;
                self.note_failure(&format!("connect error: {e}")).await;
                return Err(e.into());
            }
            Err(_) => {
                *self.inner.state.write() = ConnectionState::Disconnected;
                self.note_failure("connect timeout").await;
                return Err(WsError::ConnectTimeout(connect_timeout));
            }
        };

        let (sink, stream) = ws.split();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        *self.inner.write_tx.write() = Some(write_tx);
        *self.inner.state.write() = ConnectionState::Connected;
        self.inner.heartbeat.reset();
        info!("broker connected");

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(write_loop(write_rx, sink));
        tokio::spawn(read_loop(self.inner.clone(), stream, done_tx));
        tokio::spawn(heartbeat_loop(self.inner.clone()));

        let _ = self.inner.event_tx.send(BrokerEvent::Connected).await;
        self.resubscribe_all()?;
        Ok(done_rx)
    }

    /// Keep the connection alive until shutdown: reconnect with exponential
    /// backoff on abnormal close, refusing while the circuit is open.
    /// Attempts reset on every clean open.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut attempts = 0u32;
        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.inner.circuit.is_open() {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                    _ = shutdown.changed() => break,
                }
            }

            match self.connect().await {
                Ok(done) => {
                    attempts = 0;
                    tokio::select! {
                        reason = done => {
                            let reason = reason.unwrap_or_else(|_| "session task dropped".to_string());
                            debug!(%reason, "broker session ended");
                        }
                        _ = shutdown.changed() => {
                            self.disconnect().await;
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "broker connect failed");
                }
            }

            if !self.inner.config.reconnect || *shutdown.borrow() {
                break;
            }
            attempts += 1;
            let delay = backoff_delay(
                attempts,
                self.inner.config.reconnect_base_ms,
                self.inner.config.reconnect_max_ms,
            );
            warn!(attempts, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Close the connection. Pending requests fail with `Disconnected`.
    pub async fn disconnect(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        let tx = self.inner.write_tx.write().take();
        if let Some(tx) = tx {
            let _ = tx.send(Message::Close(None));
        }
        self.inner.pending.fail_all(|| WsError::Disconnected);
        *self.inner.state.write() = ConnectionState::Disconnected;
    }

    /// Authorize the session with a user token.
    pub async fn authorize(&self, token: &str) -> WsResult<()> {
        let req_id = self.inner.pending.next_id();
        let frame = serde_json::to_string(&AuthorizeRequest {
            authorize: token.to_string(),
            req_id,
        })?;
        self.request(req_id, frame).await?;
        Ok(())
    }

    /// Subscribe to a market's tick stream. Fire-and-forget: the broker
    /// responds with tick frames that carry the subscription id.
    pub fn subscribe_ticks(&self, market: &str) -> WsResult<()> {
        self.inner.subscriptions.insert(market);
        let req_id = self.inner.pending.next_id();
        let frame = serde_json::to_string(&TicksRequest::new(market, req_id))?;
        self.send_text(frame)
    }

    /// Drop a market's tick stream.
    pub fn unsubscribe_ticks(&self, market: &str) -> WsResult<()> {
        let Some(entry) = self.inner.subscriptions.remove(market) else {
            return Ok(());
        };
        if let Some(id) = entry.subscription_id {
            let req_id = self.inner.pending.next_id();
            let frame = serde_json::to_string(&ForgetRequest { forget: id, req_id })?;
            self.send_text(frame)?;
        }
        Ok(())
    }

    /// Request a quote for a prospective contract.
    pub async fn propose(&self, params: &ProposeParams) -> WsResult<Proposal> {
        let req_id = self.inner.pending.next_id();
        let frame = serde_json::to_string(&ProposalRequest {
            proposal: 1,
            amount: params.stake,
            basis: "stake".to_string(),
            contract_type: params.contract_type.to_string(),
            currency: params.currency.clone(),
            duration: params.duration.value,
            duration_unit: params.duration.unit.wire_code().to_string(),
            symbol: params.symbol.clone(),
            req_id,
        })?;
        let value = self.request(req_id, frame).await?;
        let payload: ProposalPayload =
            serde_json::from_value(value.get("proposal").cloned().ok_or_else(|| {
                WsError::MalformedFrame("proposal response without payload".to_string())
            })?)?;
        Ok(Proposal {
            proposal_id: payload.id,
            ask_price: to_decimal(payload.ask_price)?,
            payout: to_decimal(payload.payout)?,
            longcode: payload.longcode,
        })
    }

    /// Execute a previously proposed contract. Must follow a successful
    /// `propose`; the broker rejects unknown proposal ids.
    pub async fn buy(&self, proposal_id: &str, max_price: Decimal) -> WsResult<BuyConfirmation> {
        let req_id = self.inner.pending.next_id();
        let frame = serde_json::to_string(&BuyRequest {
            buy: proposal_id.to_string(),
            price: max_price,
            req_id,
        })?;
        let value = self.request(req_id, frame).await?;
        let payload: BuyPayload = serde_json::from_value(value.get("buy").cloned().ok_or_else(
            || WsError::MalformedFrame("buy response without payload".to_string()),
        )?)?;
        Ok(BuyConfirmation {
            contract_id: payload.contract_id.to_string(),
            buy_price: to_decimal(payload.buy_price)?,
            transaction_id: payload.transaction_id,
            payout: to_decimal(payload.payout.unwrap_or(0.0))?,
            start_time: payload.start_time,
        })
    }

    /// Sell back an open contract.
    pub async fn sell(&self, contract_id: &str, price: Decimal) -> WsResult<()> {
        let req_id = self.inner.pending.next_id();
        let frame = serde_json::to_string(&SellRequest {
            sell: contract_id.to_string(),
            price,
            req_id,
        })?;
        self.request(req_id, frame).await?;
        Ok(())
    }

    /// Cancel an open contract.
    pub async fn cancel(&self, contract_id: &str) -> WsResult<()> {
        let req_id = self.inner.pending.next_id();
        let frame = serde_json::to_string(&CancelRequest {
            cancel: contract_id.to_string(),
            req_id,
        })?;
        self.request(req_id, frame).await?;
        Ok(())
    }

    /// Arm the settlement stream for a contract. The returned receiver
    /// resolves when the broker reports the contract sold.
    pub fn monitor_contract(&self, contract_id: &str) -> WsResult<oneshot::Receiver<Settlement>> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .settlements
            .lock()
            .insert(contract_id.to_string(), tx);
        let req_id = self.inner.pending.next_id();
        let frame = serde_json::to_string(&OpenContractRequest::new(contract_id, req_id))?;
        self.send_text(frame)?;
        Ok(rx)
    }

    /// Await settlement with a deadline. `None` means the deadline expired;
    /// the contract stays open for the external reconciler.
    pub async fn wait_settlement(
        &self,
        waiter: oneshot::Receiver<Settlement>,
        timeout: Duration,
    ) -> WsResult<Option<Settlement>> {
        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(settlement)) => Ok(Some(settlement)),
            Ok(Err(_)) => Err(WsError::Disconnected),
            Err(_) => Ok(None),
        }
    }

    fn resubscribe_all(&self) -> WsResult<()> {
        let markets = self.inner.subscriptions.markets();
        if markets.is_empty() {
            return Ok(());
        }
        info!(count = markets.len(), "restoring tick subscriptions");
        for market in markets {
            let req_id = self.inner.pending.next_id();
            let frame = serde_json::to_string(&TicksRequest::new(&market, req_id))?;
            self.send_text(frame)?;
        }
        Ok(())
    }

    async fn request(&self, req_id: u64, frame: String) -> WsResult<serde_json::Value> {
        let rx = self.inner.pending.register(req_id);
        if let Err(e) = self.send_text(frame) {
            self.inner.pending.abandon(req_id);
            return Err(e);
        }
        let timeout = Duration::from_millis(self.inner.config.request_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WsError::Disconnected),
            Err(_) => {
                self.inner.pending.abandon(req_id);
                Err(WsError::RequestTimeout { req_id })
            }
        }
    }

    fn send_text(&self, text: String) -> WsResult<()> {
        match self.inner.write_tx.read().as_ref() {
            Some(tx) => tx
                .send(Message::Text(text))
                .map_err(|_| WsError::Disconnected),
            None => Err(WsError::Disconnected),
        }
    }

    async fn note_failure(&self, reason: &str) {
        if self.inner.circuit.record_failure() {
            warn!(reason, "circuit breaker opened");
            let _ = self
                .inner
                .event_tx
                .send(BrokerEvent::CircuitBreakerOpened {
                    reason: reason.to_string(),
                })
                .await;
        }
    }
}

fn to_decimal(v: f64) -> WsResult<Decimal> {
    Decimal::try_from(v).map_err(|_| WsError::MalformedFrame(format!("non-finite number {v}")))
}

async fn write_loop(mut rx: mpsc::UnboundedReceiver<Message>, mut sink: WsSink) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if sink.send(msg).await.is_err() {
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(inner: Arc<ClientInner>, mut stream: WsStream, done_tx: oneshot::Sender<String>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = route_frame(&inner, &text).await {
                    warn!(error = %e, "failed to route frame");
                }
            }
            Some(Ok(Message::Ping(data))) => {
                if let Some(tx) = inner.write_tx.read().as_ref() {
                    let _ = tx.send(Message::Pong(data));
                }
            }
            Some(Ok(Message::Pong(_))) => {
                if let Some(rtt) = inner.heartbeat.record_pong() {
                    let _ = inner
                        .event_tx
                        .send(BrokerEvent::HeartbeatLatency { latency_ms: rtt })
                        .await;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1000, "closed".to_string()));
                break format!("close code={code} reason={reason}");
            }
            Some(Err(e)) => break format!("read error: {e}"),
            None => break "stream ended".to_string(),
            _ => {}
        }
    };

    finish_session(&inner, &reason).await;
    let _ = done_tx.send(reason);
}

async fn finish_session(inner: &Arc<ClientInner>, reason: &str) {
    *inner.state.write() = ConnectionState::Disconnected;
    inner.write_tx.write().take();
    inner.pending.fail_all(|| WsError::Disconnected);

    let clean = inner.closing.load(Ordering::SeqCst);
    if !clean && inner.circuit.record_failure() {
        warn!(reason, "circuit breaker opened");
        let _ = inner
            .event_tx
            .send(BrokerEvent::CircuitBreakerOpened {
                reason: reason.to_string(),
            })
            .await;
    }

    let _ = inner
        .event_tx
        .send(BrokerEvent::Disconnected {
            reason: reason.to_string(),
        })
        .await;
}

async fn heartbeat_loop(inner: Arc<ClientInner>) {
    loop {
        inner.heartbeat.wait_for_check().await;
        if *inner.state.read() != ConnectionState::Connected {
            break;
        }
        if inner.heartbeat.is_timed_out() {
            error!("heartbeat dead-man expired, closing socket");
            let frame = CloseFrame {
                code: CloseCode::from(HEARTBEAT_CLOSE_CODE),
                reason: "heartbeat timeout".into(),
            };
            if let Some(tx) = inner.write_tx.read().as_ref() {
                let _ = tx.send(Message::Close(Some(frame)));
            }
            break;
        }
        if inner.heartbeat.should_send_ping() {
            let req_id = inner.pending.next_id();
            let frame = match serde_json::to_string(&PingRequest { ping: 1, req_id }) {
                Ok(f) => f,
                Err(_) => continue,
            };
            if let Some(tx) = inner.write_tx.read().as_ref() {
                if tx.send(Message::Text(frame)).is_ok() {
                    inner.heartbeat.record_ping();
                }
            }
        }
    }
}

async fn route_frame(inner: &Arc<ClientInner>, text: &str) -> WsResult<()> {
    match parse_frame(text)? {
        InboundFrame::Tick {
            payload,
            subscription_id,
        } => {
            if let Some(id) = subscription_id {
                inner.subscriptions.set_subscription_id(&payload.symbol, id);
            }
            if inner.subscriptions.accept_tick(&payload.symbol, payload.epoch) {
                let mut tick = Tick::new(payload.symbol, payload.epoch, payload.quote);
                if let (Some(bid), Some(ask)) = (payload.bid, payload.ask) {
                    tick = tick.with_quotes(bid, ask);
                }
                let _ = inner.event_tx.send(BrokerEvent::Tick(tick)).await;
            }
        }
        InboundFrame::OpenContract { payload } => {
            if payload.sold() {
                let settlement = Settlement {
                    contract_id: payload.contract_id.to_string(),
                    outcome: if payload.is_win() {
                        SettlementOutcome::Win
                    } else {
                        SettlementOutcome::Loss
                    },
                    pnl: to_decimal(payload.profit)?,
                };
                if let Some(tx) = inner
                    .settlements
                    .lock()
                    .remove(&settlement.contract_id)
                {
                    let _ = tx.send(settlement.clone());
                }
                let _ = inner.event_tx.send(BrokerEvent::Settled(settlement)).await;
            }
        }
        InboundFrame::Pong { .. } => {
            if let Some(rtt) = inner.heartbeat.record_pong() {
                let _ = inner
                    .event_tx
                    .send(BrokerEvent::HeartbeatLatency { latency_ms: rtt })
                    .await;
            }
        }
        InboundFrame::Response { req_id, body } => match body {
            Ok(value) => {
                if !inner.pending.resolve(req_id, Ok(value)) {
                    debug!(req_id, "response with no pending request");
                }
            }
            Err(payload) => {
                let code = BrokerErrorCode::from_wire(&payload.code);
                let delivered = inner.pending.resolve(
                    req_id,
                    Err(WsError::Broker {
                        code,
                        message: payload.message.clone(),
                    }),
                );
                if !delivered {
                    let _ = inner
                        .event_tx
                        .send(BrokerEvent::Error {
                            code,
                            message: payload.message,
                        })
                        .await;
                }
            }
        },
        InboundFrame::Other(value) => {
            debug!(frame = %value, "unrecognized frame");
        }
    }
    Ok(())
}
