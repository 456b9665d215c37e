//! Ticker subscription table with per-subscription deduplication.
//!
//! Each subscription retains the last delivered tick epoch; any tick at or
//! before it is dropped. Epochs survive reconnects so the monotonic
//! delivery invariant holds across re-subscription.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionEntry {
    /// Stream id the broker assigned, used for `forget`.
    pub subscription_id: Option<String>,
    /// Epoch of the last tick delivered for this market.
    pub last_tick_epoch: i64,
}

/// Active ticker subscriptions keyed by market symbol.
pub struct SubscriptionTable {
    inner: RwLock<HashMap<String, SubscriptionEntry>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Track a market. Keeps the existing epoch watermark when re-adding.
    pub fn insert(&self, market: &str) {
        self.inner.write().entry(market.to_string()).or_default();
    }

    /// Remove a market, returning its entry (for `forget`).
    pub fn remove(&self, market: &str) -> Option<SubscriptionEntry> {
        self.inner.write().remove(market)
    }

    pub fn contains(&self, market: &str) -> bool {
        self.inner.read().contains_key(market)
    }

    /// Record the broker-assigned stream id.
    pub fn set_subscription_id(&self, market: &str, id: String) {
        if let Some(entry) = self.inner.write().get_mut(market) {
            entry.subscription_id = Some(id);
        }
    }

    /// Dedup gate: accept the tick only if the market is subscribed and the
    /// epoch advances the watermark.
    pub fn accept_tick(&self, market: &str, epoch: i64) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(market) {
            Some(entry) => {
                if epoch <= entry.last_tick_epoch {
                    debug!(market, epoch, watermark = entry.last_tick_epoch, "stale tick dropped");
                    false
                } else {
                    entry.last_tick_epoch = epoch;
                    true
                }
            }
            None => {
                debug!(market, "tick for unsubscribed market dropped");
                false
            }
        }
    }

    /// All subscribed markets (for re-subscription after reconnect).
    pub fn markets(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}
