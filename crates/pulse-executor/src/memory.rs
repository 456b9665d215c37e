//! Memory capture collaborator.
//!
//! An optional secondary sink for trade outcomes (the ML overlay feeds on
//! it). Its failures are always caught and logged; the trade flow never
//! sees them.

use pulse_core::{TradeResult, TradeStatus};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Memory capture failed: {0}")]
pub struct MemoryError(pub String);

/// Secondary capture of trade results.
pub trait MemoryCapture: Send + Sync {
    /// Capture an executed trade.
    fn capture(&self, result: &TradeResult) -> Result<(), MemoryError>;

    /// Mark an existing memory record with a terminal outcome.
    fn record_outcome(&self, memory_id: &str, status: TradeStatus) -> Result<(), MemoryError>;
}
