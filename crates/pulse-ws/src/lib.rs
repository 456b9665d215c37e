//! Broker WebSocket client.
//!
//! Full-duplex connection to the upstream binary-options broker:
//! - request/response correlation by `req_id` with per-request timeouts
//! - ticker subscription multiplexing with per-subscription dedup
//! - application-level heartbeat with a dead-man timer
//! - exponential backoff reconnect and a failure-windowed circuit breaker
//! - settlement stream routed into a per-contract index

pub mod circuit;
pub mod client;
pub mod correlation;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod subscription;

pub use circuit::CircuitBreaker;
pub use client::{
    backoff_delay, BrokerClient, BrokerConfig, BrokerEvent, BuyConfirmation, ConnectionState,
    Proposal, ProposeParams, Settlement,
};
pub use correlation::PendingRequests;
pub use error::{BrokerErrorCode, WsError, WsResult};
pub use heartbeat::HeartbeatManager;
pub use subscription::SubscriptionTable;
