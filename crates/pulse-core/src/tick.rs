//! Tick: one broker-delivered quote for one market at one epoch.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// A single market quote.
///
/// Identity is `(market, epoch)`. Ticks are immutable once emitted; the
/// feed layer guarantees strictly increasing epoch per market downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Broker symbol, e.g. `R_100`.
    pub market: String,
    /// Quote time in epoch seconds.
    pub epoch: i64,
    /// Mid quote.
    pub quote: f64,
    /// Best bid, when the broker provides one.
    pub bid: Option<f64>,
    /// Best ask, when the broker provides one.
    pub ask: Option<f64>,
    /// Ask minus bid, when both sides are present.
    pub spread: Option<f64>,
    /// Rolling annualized volatility, filled in by the feed layer.
    pub volatility: Option<f64>,
}

impl Tick {
    /// Create a tick with just the mandatory fields.
    pub fn new(market: impl Into<String>, epoch: i64, quote: f64) -> Self {
        Self {
            market: market.into(),
            epoch,
            quote,
            bid: None,
            ask: None,
            spread: None,
            volatility: None,
        }
    }

    /// Attach bid/ask and derive the spread.
    pub fn with_quotes(mut self, bid: f64, ask: f64) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self.spread = Some(ask - bid);
        self
    }

    /// Schema validation: non-empty market, positive epoch, finite positive quote.
    pub fn validate(&self) -> Result<()> {
        if self.market.is_empty() {
            return Err(CoreError::InvalidTick("empty market".to_string()));
        }
        if self.epoch <= 0 {
            return Err(CoreError::InvalidTick(format!(
                "non-positive epoch {}",
                self.epoch
            )));
        }
        if !self.quote.is_finite() || self.quote <= 0.0 {
            return Err(CoreError::InvalidTick(format!(
                "invalid quote {}",
                self.quote
            )));
        }
        for (name, v) in [("bid", self.bid), ("ask", self.ask)] {
            if let Some(v) = v {
                if !v.is_finite() || v <= 0.0 {
                    return Err(CoreError::InvalidTick(format!("invalid {name} {v}")));
                }
            }
        }
        Ok(())
    }

    /// Tick identity: `(market, epoch)`.
    pub fn identity(&self) -> (&str, i64) {
        (&self.market, self.epoch)
    }
}
