//! Signal engine.
//!
//! Maintains per-market rolling indicator state, evaluates an ordered
//! registry of rule strategies against each tick, and emits the highest
//! confidence candidate that clears the session's confidence floor.

pub mod engine;
pub mod history;
pub mod indicators;
pub mod state;
pub mod strategies;

pub use engine::{SignalEngine, SignalEngineConfig};
pub use history::MarketHistory;
pub use state::{IndicatorParams, IndicatorState};
pub use strategies::{default_registry, Strategy, StrategyContext};
