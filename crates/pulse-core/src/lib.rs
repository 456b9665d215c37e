//! Core domain types for the pulse trading pipeline.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Tick`: one broker quote for one market at one epoch
//! - `Signal`: a candidate trade intent with confidence
//! - `Session`, `Participant`: multi-user trading contexts
//! - `RiskCheck`, `UserRiskState`: risk guard inputs and decisions
//! - `TradeResult`: order lifecycle outcomes
//! - `PipelineEvent`, `EventBus`: the typed event surface

pub mod error;
pub mod events;
pub mod market;
pub mod risk;
pub mod session;
pub mod signal;
pub mod tick;
pub mod trade;

pub use error::{CoreError, ErrorKind, Result};
pub use events::{EventBus, PipelineEvent};
pub use market::MarketClass;
pub use risk::{RejectReason, RiskCheck, RiskVerdict, UserRiskState};
pub use session::{
    Participant, ParticipantStatus, RiskProfile, RiskProfileParams, Session, SessionConfig,
    SessionStatus,
};
pub use signal::{
    ContractDuration, DurationUnit, IndicatorSnapshot, Signal, SignalKind, SignalMetadata,
};
pub use tick::Tick;
pub use trade::{SettlementOutcome, TradeMetadata, TradeResult, TradeStatus};
