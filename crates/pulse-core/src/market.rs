//! Market classification by broker symbol.

use serde::{Deserialize, Serialize};

/// Broad market class derived from the broker symbol.
///
/// Strategies declare which classes they apply to, and the executor's
/// duration heuristic keys off the same classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketClass {
    /// Synthetic volatility indices (`R_*`, `1HZ*`). Continuous, 24/7.
    Synthetic,
    /// Currency pairs containing USD or EUR.
    Forex,
    /// Everything else (commodities, crypto crosses, baskets).
    Other,
}

impl MarketClass {
    /// Classify a broker symbol.
    pub fn of(symbol: &str) -> Self {
        if symbol.starts_with("R_") || symbol.starts_with("1HZ") {
            Self::Synthetic
        } else if symbol.contains("USD") || symbol.contains("EUR") {
            Self::Forex
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for MarketClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synthetic => write!(f, "synthetic"),
            Self::Forex => write!(f, "forex"),
            Self::Other => write!(f, "other"),
        }
    }
}
