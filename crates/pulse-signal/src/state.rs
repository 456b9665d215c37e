//! Per-market rolling indicator state.
//!
//! One state per market, mutated only by the signal engine, one tick at a
//! time. History is bounded; the oldest quote falls off on overflow.

use crate::indicators;
use pulse_core::IndicatorSnapshot;

/// Indicator periods and bounds.
#[derive(Debug, Clone)]
pub struct IndicatorParams {
    pub fast_ema_period: usize,
    pub slow_ema_period: usize,
    pub rsi_period: usize,
    pub bollinger_period: usize,
    pub bollinger_mult: f64,
    pub atr_period: usize,
    pub adx_period: usize,
    pub stochastic_period: usize,
    pub momentum_period: usize,
    pub volatility_window: usize,
    pub history_cap: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            fast_ema_period: 9,
            slow_ema_period: 21,
            rsi_period: 14,
            bollinger_period: 20,
            bollinger_mult: 2.0,
            atr_period: 14,
            adx_period: 14,
            stochastic_period: 14,
            momentum_period: 10,
            volatility_window: 20,
            history_cap: 100,
        }
    }
}

/// Rolling indicator values for one market.
#[derive(Debug, Clone, Default)]
pub struct IndicatorState {
    history: Vec<f64>,
    pub prev_fast_ema: f64,
    pub prev_slow_ema: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub prev_rsi: f64,
    pub rsi: f64,
    /// `(macd, signal, histogram)`.
    pub macd: (f64, f64, f64),
    pub prev_macd_histogram: f64,
    /// `(upper, middle, lower, width)`.
    pub bollinger: (f64, f64, f64, f64),
    pub atr: f64,
    pub adx: f64,
    /// `(k, d)`.
    pub stochastic: (f64, f64),
    pub momentum: f64,
    pub volatility: f64,
}

impl IndicatorState {
    pub fn new() -> Self {
        Self {
            rsi: 50.0,
            prev_rsi: 50.0,
            ..Default::default()
        }
    }

    /// Fold one quote into the state and recompute every indicator.
    pub fn update(&mut self, quote: f64, params: &IndicatorParams) {
        self.history.push(quote);
        if self.history.len() > params.history_cap {
            self.history.remove(0);
        }

        self.prev_fast_ema = self.fast_ema;
        self.prev_slow_ema = self.slow_ema;
        self.prev_rsi = self.rsi;
        self.prev_macd_histogram = self.macd.2;

        let prices = &self.history;
        self.fast_ema = indicators::ema(prices, params.fast_ema_period);
        self.slow_ema = indicators::ema(prices, params.slow_ema_period);
        self.rsi = indicators::rsi(prices, params.rsi_period);
        self.macd = indicators::macd(prices);
        self.bollinger =
            indicators::bollinger(prices, params.bollinger_period, params.bollinger_mult);
        self.atr = indicators::atr(prices, params.atr_period);
        self.adx = indicators::adx(prices, params.adx_period);
        self.stochastic = indicators::stochastic(prices, params.stochastic_period);
        self.momentum = indicators::momentum(prices, params.momentum_period);
        self.volatility = indicators::volatility(prices, params.volatility_window);
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn prices(&self) -> &[f64] {
        &self.history
    }

    pub fn last_quote(&self) -> Option<f64> {
        self.history.last().copied()
    }

    /// Freeze the current values into a metadata snapshot.
    pub fn snapshot(&self) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: self.rsi,
            fast_ema: self.fast_ema,
            slow_ema: self.slow_ema,
            macd: self.macd.0,
            macd_signal: self.macd.1,
            macd_histogram: self.macd.2,
            bollinger_upper: self.bollinger.0,
            bollinger_middle: self.bollinger.1,
            bollinger_lower: self.bollinger.2,
            bollinger_width: self.bollinger.3,
            atr: self.atr,
            adx: self.adx,
            stochastic_k: self.stochastic.0,
            stochastic_d: self.stochastic.1,
            momentum: self.momentum,
            volatility: self.volatility,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_bounded() {
        let params = IndicatorParams::default();
        let mut state = IndicatorState::new();
        for i in 0..150 {
            state.update(100.0 + i as f64, &params);
        }
        assert_eq!(state.len(), 100);
        // Oldest quotes were discarded.
        assert_eq!(state.prices()[0], 150.0);
    }

    #[test]
    fn test_prev_values_track_one_step_behind() {
        let params = IndicatorParams::default();
        let mut state = IndicatorState::new();
        for i in 0..30 {
            state.update(100.0 + i as f64, &params);
        }
        let fast_before = state.fast_ema;
        state.update(200.0, &params);
        assert_eq!(state.prev_fast_ema, fast_before);
        assert!(state.fast_ema > fast_before);
    }

    #[test]
    fn test_snapshot_mirrors_state() {
        let params = IndicatorParams::default();
        let mut state = IndicatorState::new();
        for i in 0..40 {
            state.update(100.0 + (i % 7) as f64, &params);
        }
        let snap = state.snapshot();
        assert_eq!(snap.rsi, state.rsi);
        assert_eq!(snap.fast_ema, state.fast_ema);
        assert_eq!(snap.bollinger_width, state.bollinger.3);
        assert_eq!(snap.stochastic_k, state.stochastic.0);
    }
}
