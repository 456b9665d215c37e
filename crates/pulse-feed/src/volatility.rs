//! Rolling volatility from log returns.
//!
//! Standard deviation of log returns over a quote window, annualized for
//! a per-second tick cadence (`sqrt(seconds per year)`).

use std::collections::VecDeque;

const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// Windowed annualized volatility estimator for one market.
pub struct RollingVolatility {
    window: usize,
    quotes: VecDeque<f64>,
}

impl RollingVolatility {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            quotes: VecDeque::with_capacity(window),
        }
    }

    /// Push a quote and return the annualized volatility over the current
    /// window, or `None` until two quotes are available.
    pub fn push(&mut self, quote: f64) -> Option<f64> {
        if self.quotes.len() == self.window {
            self.quotes.pop_front();
        }
        self.quotes.push_back(quote);

        if self.quotes.len() < 2 {
            return None;
        }

        let returns: Vec<f64> = self
            .quotes
            .iter()
            .zip(self.quotes.iter().skip(1))
            .map(|(a, b)| (b / a).ln())
            .collect();

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;

        Some(variance.sqrt() * SECONDS_PER_YEAR.sqrt())
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
