//! Broker session seam.
//!
//! The executor talks to the broker through these traits so tests can
//! mock the socket away entirely. The production factory opens a fresh
//! `pulse-ws` client per order with reconnect disabled: exactly one
//! owner per order, credentials never shared.

use async_trait::async_trait;
use pulse_ws::{
    BrokerClient, BrokerConfig, BrokerEvent, BuyConfirmation, Proposal, ProposeParams, Settlement,
    WsError, WsResult,
};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::mpsc;

/// One authorized broker connection scoped to one order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn authorize(&self, token: &str) -> WsResult<()>;
    async fn propose(&self, params: &ProposeParams) -> WsResult<Proposal>;
    async fn buy(&self, proposal_id: &str, max_price: Decimal) -> WsResult<BuyConfirmation>;
    /// Arm the settlement stream and wait. `Ok(None)` means the deadline
    /// expired with the contract still open.
    async fn wait_settlement(
        &self,
        contract_id: &str,
        timeout: Duration,
    ) -> WsResult<Option<Settlement>>;
    async fn disconnect(&self);
}

/// Opens fresh sessions.
#[async_trait]
pub trait BrokerSessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrokerSession>, WsError>;
}

/// Production session over a dedicated `BrokerClient`.
pub struct WsBrokerSession {
    client: BrokerClient,
    /// Keeps the per-order event stream alive; nothing consumes it.
    _events: mpsc::Receiver<BrokerEvent>,
}

#[async_trait]
impl BrokerSession for WsBrokerSession {
    async fn authorize(&self, token: &str) -> WsResult<()> {
        self.client.authorize(token).await
    }

    async fn propose(&self, params: &ProposeParams) -> WsResult<Proposal> {
        self.client.propose(params).await
    }

    async fn buy(&self, proposal_id: &str, max_price: Decimal) -> WsResult<BuyConfirmation> {
        self.client.buy(proposal_id, max_price).await
    }

    async fn wait_settlement(
        &self,
        contract_id: &str,
        timeout: Duration,
    ) -> WsResult<Option<Settlement>> {
        let waiter = self.client.monitor_contract(contract_id)?;
        self.client.wait_settlement(waiter, timeout).await
    }

    async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

/// Production factory: fresh client per order, reconnect disabled.
pub struct WsSessionFactory {
    config: BrokerConfig,
}

impl WsSessionFactory {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config: config.for_order(),
        }
    }
}

#[async_trait]
impl BrokerSessionFactory for WsSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrokerSession>, WsError> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let client = BrokerClient::new(self.config.clone(), event_tx);
        client.connect().await?;
        Ok(Box::new(WsBrokerSession {
            client,
            _events: event_rx,
        }))
    }
}
