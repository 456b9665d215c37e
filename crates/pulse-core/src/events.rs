//! Typed event surface of the pipeline.
//!
//! The core publishes; the external fan-out layer subscribes. Components
//! never reach across the pipeline through this bus — wiring between core
//! components is explicit channels owned by the composition root.

use crate::risk::RiskCheck;
use crate::session::SessionStatus;
use crate::signal::Signal;
use crate::trade::TradeResult;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Events emitted by the core pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    SignalEmitted(Signal),
    RiskCheckCompleted(RiskCheck),
    TradeExecuted(TradeResult),
    TradeSettled(TradeResult),
    SessionStatusUpdate {
        session_id: String,
        status: SessionStatus,
    },
}

/// Broadcast bus for pipeline events.
///
/// Cloning is cheap; all clones share one channel. Lagged subscribers lose
/// oldest events, which is acceptable for the external surface — nothing on
/// the execution path consumes this bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. A send error only means no subscriber is attached.
    pub fn publish(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            trace!("event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
