//! External store interfaces.
//!
//! The pipeline owns no persistence engine. This crate defines the
//! capability traits the core consumes — a relational durable store, a
//! broker credential source, and an idempotency KV with SET NX EX
//! semantics — plus in-memory implementations used by tests and
//! single-node deployments.

pub mod credentials;
pub mod error;
pub mod kv;
pub mod store;

pub use credentials::{BrokerAccount, CredentialSource, InMemoryCredentials};
pub use error::{KvError, StoreError, StoreResult};
pub use kv::{IdempotencyKv, InMemoryKv};
pub use store::{
    parse_config_json, DurableStore, InMemoryStore, ParticipantRow, SessionRow, TradeRow,
};
