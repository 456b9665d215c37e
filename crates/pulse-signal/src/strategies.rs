//! Rule strategies.
//!
//! A fixed, ordered registry. Each strategy sees the price window and the
//! current indicator state and may return a candidate signal; candidates
//! below the strategy's own confidence floor are discarded. When several
//! fire on one tick the engine keeps the highest confidence, breaking
//! ties by registry order.

use crate::history::MarketHistory;
use crate::state::IndicatorState;
use pulse_core::{MarketClass, Signal, SignalKind};

/// Inputs a strategy evaluates against.
pub struct StrategyContext<'a> {
    pub market: &'a str,
    pub class: MarketClass,
    pub prices: &'a [f64],
    pub state: &'a IndicatorState,
    pub history: Option<&'a MarketHistory>,
}

/// One rule in the registry.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Confidence floor below which this strategy's candidates are dropped.
    fn min_confidence(&self) -> f64;

    /// Market classes this rule applies to. Non-matching markets skip it.
    fn applies_to(&self, class: MarketClass) -> bool {
        let _ = class;
        true
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal>;
}

/// The fixed registry, in priority (tie-break) order.
pub fn default_registry() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(RsiDivergence),
        Box::new(EmaCrossMomentum),
        Box::new(BollingerSqueezeBreakout),
        Box::new(MacdZeroCross),
        Box::new(StochasticExtremes),
        Box::new(VolatilitySpike),
        Box::new(SupportResistanceBounce),
        Box::new(AdxStrongTrend),
        Box::new(IndicatorConfluence),
        Box::new(AdaptiveWinRate),
    ]
}

// ============================================================================
// Oscillator reversal rules
// ============================================================================

/// RSI leaving an extreme while price has not yet turned: a divergence
/// proxy on a single quote series.
pub struct RsiDivergence;

impl Strategy for RsiDivergence {
    fn name(&self) -> &'static str {
        "rsi_divergence"
    }

    fn min_confidence(&self) -> f64 {
        0.6
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let s = cx.state;
        if s.rsi < 30.0 && s.rsi > s.prev_rsi {
            let confidence = 0.6 + (30.0 - s.rsi.min(30.0)) / 100.0;
            return Some(Signal::new(
                SignalKind::Call,
                cx.market,
                confidence,
                format!("{}: rsi {:.1} rising out of oversold", self.name(), s.rsi),
            ));
        }
        if s.rsi > 70.0 && s.rsi < s.prev_rsi {
            let confidence = 0.6 + (s.rsi.max(70.0) - 70.0) / 100.0;
            return Some(Signal::new(
                SignalKind::Put,
                cx.market,
                confidence,
                format!("{}: rsi {:.1} falling out of overbought", self.name(), s.rsi),
            ));
        }
        None
    }
}

/// Stochastic %K at an extreme and crossing its %D smoothing.
pub struct StochasticExtremes;

impl Strategy for StochasticExtremes {
    fn name(&self) -> &'static str {
        "stochastic_extremes"
    }

    fn min_confidence(&self) -> f64 {
        0.6
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let (k, d) = cx.state.stochastic;
        if k < 20.0 && k > d {
            let confidence = 0.6 + (20.0 - k) / 100.0;
            return Some(Signal::new(
                SignalKind::Call,
                cx.market,
                confidence,
                format!("{}: k {:.1} turning up under 20", self.name(), k),
            ));
        }
        if k > 80.0 && k < d {
            let confidence = 0.6 + (k - 80.0) / 100.0;
            return Some(Signal::new(
                SignalKind::Put,
                cx.market,
                confidence,
                format!("{}: k {:.1} turning down over 80", self.name(), k),
            ));
        }
        None
    }
}

// ============================================================================
// Trend rules
// ============================================================================

/// Fast/slow EMA crossover with momentum confirmation, gated on trend
/// strength (ADX >= 20).
pub struct EmaCrossMomentum;

impl EmaCrossMomentum {
    fn crossover(state: &IndicatorState) -> Option<SignalKind> {
        if state.prev_fast_ema == 0.0 && state.prev_slow_ema == 0.0 {
            return None;
        }
        if state.prev_fast_ema <= state.prev_slow_ema && state.fast_ema > state.slow_ema {
            Some(SignalKind::Call)
        } else if state.prev_fast_ema >= state.prev_slow_ema && state.fast_ema < state.slow_ema {
            Some(SignalKind::Put)
        } else {
            None
        }
    }
}

impl Strategy for EmaCrossMomentum {
    fn name(&self) -> &'static str {
        "ema_cross_momentum"
    }

    fn min_confidence(&self) -> f64 {
        0.65
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let s = cx.state;
        if s.adx < 20.0 {
            return None;
        }
        let kind = Self::crossover(s)?;
        // Momentum must agree with the crossover direction.
        match kind {
            SignalKind::Call if s.momentum <= 0.0 => return None,
            SignalKind::Put if s.momentum >= 0.0 => return None,
            _ => {}
        }
        let mut confidence = (0.7 + 2.0 * s.momentum.abs()).min(0.95);
        if s.volatility > 0.02 {
            confidence *= 0.9;
        }
        Some(Signal::new(
            kind,
            cx.market,
            confidence,
            format!(
                "{}: fast {:.4} crossed slow {:.4}, momentum {:.4}",
                self.name(),
                s.fast_ema,
                s.slow_ema,
                s.momentum
            ),
        ))
    }
}

/// MACD histogram flipping sign.
pub struct MacdZeroCross;

impl Strategy for MacdZeroCross {
    fn name(&self) -> &'static str {
        "macd_zero_cross"
    }

    fn min_confidence(&self) -> f64 {
        0.65
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let s = cx.state;
        let hist = s.macd.2;
        let prev = s.prev_macd_histogram;
        let close = s.last_quote()?;
        if close == 0.0 {
            return None;
        }
        let kind = if prev <= 0.0 && hist > 0.0 {
            SignalKind::Call
        } else if prev >= 0.0 && hist < 0.0 {
            SignalKind::Put
        } else {
            return None;
        };
        let strength = (hist.abs() / close * 1000.0).min(0.15);
        let confidence = 0.65 + strength;
        Some(Signal::new(
            kind,
            cx.market,
            confidence,
            format!("{}: histogram {:.5} crossed zero", self.name(), hist),
        ))
    }
}

/// ADX reporting a strong one-sided trend; direction from EMA alignment.
pub struct AdxStrongTrend;

impl Strategy for AdxStrongTrend {
    fn name(&self) -> &'static str {
        "adx_strong_trend"
    }

    fn min_confidence(&self) -> f64 {
        0.6
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let s = cx.state;
        if s.adx < 40.0 {
            return None;
        }
        let kind = if s.fast_ema > s.slow_ema {
            SignalKind::Call
        } else if s.fast_ema < s.slow_ema {
            SignalKind::Put
        } else {
            return None;
        };
        let confidence = (0.6 + s.adx / 200.0).min(0.85);
        Some(Signal::new(
            kind,
            cx.market,
            confidence,
            format!("{}: adx {:.1} with aligned emas", self.name(), s.adx),
        ))
    }
}

// ============================================================================
// Volatility rules
// ============================================================================

/// Tight Bollinger squeeze resolving with a close outside the bands.
pub struct BollingerSqueezeBreakout;

impl Strategy for BollingerSqueezeBreakout {
    fn name(&self) -> &'static str {
        "bollinger_squeeze_breakout"
    }

    fn min_confidence(&self) -> f64 {
        0.65
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let s = cx.state;
        let (upper, middle, lower, width) = s.bollinger;
        if width >= 0.01 || middle == 0.0 {
            return None;
        }
        let close = s.last_quote()?;
        let kind = if close > upper {
            SignalKind::Call
        } else if close < lower {
            SignalKind::Put
        } else {
            return None;
        };
        let escape = ((close - middle).abs() / middle * 10.0).min(0.2);
        let confidence = 0.65 + escape;
        Some(Signal::new(
            kind,
            cx.market,
            confidence,
            format!(
                "{}: width {:.4} squeeze broke at {:.4}",
                self.name(),
                width,
                close
            ),
        ))
    }
}

/// Volatility expansion with directional momentum. Synthetic indices only:
/// their volatility regime shifts are mechanical and tradeable.
pub struct VolatilitySpike;

impl Strategy for VolatilitySpike {
    fn name(&self) -> &'static str {
        "volatility_spike"
    }

    fn min_confidence(&self) -> f64 {
        0.55
    }

    fn applies_to(&self, class: MarketClass) -> bool {
        class == MarketClass::Synthetic
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let s = cx.state;
        if s.volatility < 0.02 || s.momentum.abs() < 0.005 {
            return None;
        }
        let kind = if s.momentum > 0.0 {
            SignalKind::Call
        } else {
            SignalKind::Put
        };
        let confidence = (0.55 + s.momentum.abs() * 20.0).min(0.8);
        Some(Signal::new(
            kind,
            cx.market,
            confidence,
            format!(
                "{}: volatility {:.4} with momentum {:.4}",
                self.name(),
                s.volatility,
                s.momentum
            ),
        ))
    }
}

// ============================================================================
// Structure rules
// ============================================================================

/// Bounce off the window low/high. Forex and other non-synthetic markets,
/// where ranges come from real order flow.
pub struct SupportResistanceBounce;

impl Strategy for SupportResistanceBounce {
    fn name(&self) -> &'static str {
        "support_resistance_bounce"
    }

    fn min_confidence(&self) -> f64 {
        0.6
    }

    fn applies_to(&self, class: MarketClass) -> bool {
        class != MarketClass::Synthetic
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        if cx.prices.len() < 2 {
            return None;
        }
        let close = *cx.prices.last()?;
        let prev = cx.prices[cx.prices.len() - 2];
        let low = cx.prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let high = cx.prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if low <= 0.0 || high <= low {
            return None;
        }

        let near_low = (close - low) / low < 0.002;
        let near_high = (high - close) / high < 0.002;
        if near_low && close > prev {
            return Some(Signal::new(
                SignalKind::Call,
                cx.market,
                0.65,
                format!("{}: bounce off support {:.4}", self.name(), low),
            ));
        }
        if near_high && close < prev {
            return Some(Signal::new(
                SignalKind::Put,
                cx.market,
                0.65,
                format!("{}: rejection at resistance {:.4}", self.name(), high),
            ));
        }
        None
    }
}

/// Several independent indicators agreeing at once.
pub struct IndicatorConfluence;

impl Strategy for IndicatorConfluence {
    fn name(&self) -> &'static str {
        "indicator_confluence"
    }

    fn min_confidence(&self) -> f64 {
        0.75
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let s = cx.state;
        let close = s.last_quote()?;
        let middle = s.bollinger.1;

        let bullish = [
            s.rsi < 35.0,
            s.fast_ema > s.slow_ema,
            s.macd.2 > 0.0,
            s.momentum > 0.0,
            middle != 0.0 && close > middle,
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        let bearish = [
            s.rsi > 65.0,
            s.fast_ema < s.slow_ema,
            s.macd.2 < 0.0,
            s.momentum < 0.0,
            middle != 0.0 && close < middle,
        ]
        .iter()
        .filter(|&&v| v)
        .count();

        let (kind, votes) = if bullish >= 4 {
            (SignalKind::Call, bullish)
        } else if bearish >= 4 {
            (SignalKind::Put, bearish)
        } else {
            return None;
        };
        let confidence = (0.6 + 0.05 * votes as f64).min(0.9);
        Some(Signal::new(
            kind,
            cx.market,
            confidence,
            format!("{}: {votes} aligned indicators", self.name()),
        ))
    }
}

/// Conditions on the market's historical win rate: only trades markets
/// this pipeline has actually done well on.
pub struct AdaptiveWinRate;

const ADAPTIVE_MIN_SAMPLES: u64 = 20;

impl Strategy for AdaptiveWinRate {
    fn name(&self) -> &'static str {
        "adaptive_win_rate"
    }

    fn min_confidence(&self) -> f64 {
        0.65
    }

    fn evaluate(&self, cx: &StrategyContext<'_>) -> Option<Signal> {
        let history = cx.history?;
        if history.samples() < ADAPTIVE_MIN_SAMPLES {
            return None;
        }
        let win_rate = history.win_rate()?;
        if win_rate < 0.45 {
            return None;
        }

        let s = cx.state;
        let kind = if s.momentum > 0.0 && s.fast_ema > s.slow_ema {
            SignalKind::Call
        } else if s.momentum < 0.0 && s.fast_ema < s.slow_ema {
            SignalKind::Put
        } else {
            return None;
        };
        let confidence = (0.5 + win_rate * 0.4).min(0.9);
        Some(Signal::new(
            kind,
            cx.market,
            confidence,
            format!("{}: win rate {:.2} over {} trades", self.name(), win_rate, history.samples()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IndicatorParams;

    fn context<'a>(
        state: &'a IndicatorState,
        prices: &'a [f64],
        history: Option<&'a MarketHistory>,
    ) -> StrategyContext<'a> {
        StrategyContext {
            market: "R_100",
            class: MarketClass::Synthetic,
            prices,
            state,
            history,
        }
    }

    fn state_with(f: impl FnOnce(&mut IndicatorState)) -> IndicatorState {
        let mut state = IndicatorState::new();
        f(&mut state);
        state
    }

    #[test]
    fn test_registry_order_is_fixed() {
        let names: Vec<&str> = default_registry().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "rsi_divergence",
                "ema_cross_momentum",
                "bollinger_squeeze_breakout",
                "macd_zero_cross",
                "stochastic_extremes",
                "volatility_spike",
                "support_resistance_bounce",
                "adx_strong_trend",
                "indicator_confluence",
                "adaptive_win_rate",
            ]
        );
    }

    #[test]
    fn test_ema_cross_call() {
        let state = state_with(|s| {
            s.prev_fast_ema = 99.0;
            s.prev_slow_ema = 100.0;
            s.fast_ema = 101.0;
            s.slow_ema = 100.0;
            s.adx = 35.0;
            s.momentum = 0.01;
            s.volatility = 0.005;
        });
        let prices = vec![100.0, 101.0];
        let signal = EmaCrossMomentum.evaluate(&context(&state, &prices, None)).unwrap();
        assert_eq!(signal.kind, SignalKind::Call);
        let expected = (0.7 + 2.0 * 0.01_f64).min(0.95);
        assert!((signal.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_ema_cross_gated_by_adx() {
        let state = state_with(|s| {
            s.prev_fast_ema = 99.0;
            s.prev_slow_ema = 100.0;
            s.fast_ema = 101.0;
            s.slow_ema = 100.0;
            s.adx = 10.0;
            s.momentum = 0.01;
        });
        let prices = vec![100.0, 101.0];
        assert!(EmaCrossMomentum.evaluate(&context(&state, &prices, None)).is_none());
    }

    #[test]
    fn test_ema_cross_volatility_damping() {
        let state = state_with(|s| {
            s.prev_fast_ema = 99.0;
            s.prev_slow_ema = 100.0;
            s.fast_ema = 101.0;
            s.slow_ema = 100.0;
            s.adx = 35.0;
            s.momentum = 0.05;
            s.volatility = 0.03;
        });
        let prices = vec![100.0, 101.0];
        let signal = EmaCrossMomentum.evaluate(&context(&state, &prices, None)).unwrap();
        let expected = (0.7 + 2.0 * 0.05_f64).min(0.95) * 0.9;
        assert!((signal.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_divergence_both_sides() {
        let oversold = state_with(|s| {
            s.rsi = 25.0;
            s.prev_rsi = 22.0;
        });
        let prices = vec![100.0];
        let signal = RsiDivergence.evaluate(&context(&oversold, &prices, None)).unwrap();
        assert_eq!(signal.kind, SignalKind::Call);

        let overbought = state_with(|s| {
            s.rsi = 78.0;
            s.prev_rsi = 82.0;
        });
        let signal = RsiDivergence.evaluate(&context(&overbought, &prices, None)).unwrap();
        assert_eq!(signal.kind, SignalKind::Put);

        // Still falling into oversold: no divergence yet.
        let falling = state_with(|s| {
            s.rsi = 25.0;
            s.prev_rsi = 28.0;
        });
        assert!(RsiDivergence.evaluate(&context(&falling, &prices, None)).is_none());
    }

    #[test]
    fn test_stochastic_extremes() {
        let state = state_with(|s| s.stochastic = (12.0, 10.0));
        let prices = vec![100.0];
        let signal = StochasticExtremes.evaluate(&context(&state, &prices, None)).unwrap();
        assert_eq!(signal.kind, SignalKind::Call);

        let state = state_with(|s| s.stochastic = (88.0, 92.0));
        let signal = StochasticExtremes.evaluate(&context(&state, &prices, None)).unwrap();
        assert_eq!(signal.kind, SignalKind::Put);
    }

    #[test]
    fn test_bollinger_squeeze_breakout() {
        let params = IndicatorParams::default();
        let prices = vec![101.5];

        // Close above the upper band during a squeeze fires a CALL.
        let mut state = IndicatorState::new();
        state.update(101.5, &params);
        state.bollinger = (101.0, 100.5, 100.0, 0.005);
        let signal = BollingerSqueezeBreakout
            .evaluate(&context(&state, &prices, None))
            .unwrap();
        assert_eq!(signal.kind, SignalKind::Call);

        // Wide bands (no squeeze) suppress the rule entirely.
        state.bollinger = (101.0, 100.5, 100.0, 0.05);
        assert!(BollingerSqueezeBreakout
            .evaluate(&context(&state, &prices, None))
            .is_none());
    }

    #[test]
    fn test_volatility_spike_class_gate() {
        assert!(VolatilitySpike.applies_to(MarketClass::Synthetic));
        assert!(!VolatilitySpike.applies_to(MarketClass::Forex));
    }

    #[test]
    fn test_support_bounce() {
        let prices: Vec<f64> = vec![1.105, 1.103, 1.101, 1.1, 1.1005];
        let state = IndicatorState::new();
        let cx = StrategyContext {
            market: "frxEURUSD",
            class: MarketClass::Forex,
            prices: &prices,
            state: &state,
            history: None,
        };
        let signal = SupportResistanceBounce.evaluate(&cx).unwrap();
        assert_eq!(signal.kind, SignalKind::Call);
    }

    #[test]
    fn test_adaptive_requires_samples_and_win_rate() {
        let state = state_with(|s| {
            s.momentum = 0.01;
            s.fast_ema = 101.0;
            s.slow_ema = 100.0;
        });
        let prices = vec![100.0];

        // No history at all.
        assert!(AdaptiveWinRate.evaluate(&context(&state, &prices, None)).is_none());

        // Too few samples.
        let thin = MarketHistory { wins: 5, losses: 5 };
        assert!(AdaptiveWinRate
            .evaluate(&context(&state, &prices, Some(&thin)))
            .is_none());

        // Poor win rate.
        let losing = MarketHistory { wins: 5, losses: 20 };
        assert!(AdaptiveWinRate
            .evaluate(&context(&state, &prices, Some(&losing)))
            .is_none());

        // Healthy history fires.
        let winning = MarketHistory { wins: 15, losses: 10 };
        let signal = AdaptiveWinRate
            .evaluate(&context(&state, &prices, Some(&winning)))
            .unwrap();
        assert_eq!(signal.kind, SignalKind::Call);
        assert!((signal.confidence - (0.5 + 0.6 * 0.4)).abs() < 1e-9);
    }

    #[test]
    fn test_confluence_needs_four_votes() {
        let params = IndicatorParams::default();
        let mut state = IndicatorState::new();
        state.update(100.0, &params);
        state.rsi = 30.0;
        state.fast_ema = 101.0;
        state.slow_ema = 100.0;
        state.macd = (0.1, 0.05, 0.05);
        state.momentum = 0.01;
        state.bollinger = (101.0, 99.0, 97.0, 0.04);
        let prices = vec![100.0];
        let signal = IndicatorConfluence.evaluate(&context(&state, &prices, None)).unwrap();
        assert_eq!(signal.kind, SignalKind::Call);

        // Take away two votes: below the threshold.
        state.momentum = -0.01;
        state.macd = (0.1, 0.2, -0.1);
        assert!(IndicatorConfluence.evaluate(&context(&state, &prices, None)).is_none());
    }
}
