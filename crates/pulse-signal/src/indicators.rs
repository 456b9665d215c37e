//! Indicator kernel: pure functions over a quote series.
//!
//! Quotes arrive as a single mid series, so ATR and ADX treat it as both
//! high and low. That is a documented approximation, not an oversight;
//! strategies gated on those two read them accordingly.

/// Simple moving average over the trailing `period` quotes.
pub fn sma(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() || period == 0 {
        return 0.0;
    }
    let n = period.min(prices.len());
    let slice = &prices[prices.len() - n..];
    slice.iter().sum::<f64>() / n as f64
}

/// Exponential moving average.
///
/// Seeded with the SMA of the first `period` quotes, then
/// `ema = (price - ema) * 2/(period+1) + ema`. With fewer than `period`
/// quotes the most recent quote is returned.
pub fn ema(prices: &[f64], period: usize) -> f64 {
    let Some(&last) = prices.last() else {
        return 0.0;
    };
    if period == 0 || prices.len() < period {
        return last;
    }
    let mut value = prices[..period].iter().sum::<f64>() / period as f64;
    let k = 2.0 / (period as f64 + 1.0);
    for &price in &prices[period..] {
        value = (price - value) * k + value;
    }
    value
}

/// Relative strength index over the trailing `period` deltas.
///
/// Gains and losses are averaged arithmetically. Returns 100 when the
/// average loss is zero, and the neutral 50 with insufficient data.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }
    let window = &prices[prices.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD(12, 26) with a 9-period signal line over the MACD series.
/// Returns `(macd, signal, histogram)`.
pub fn macd(prices: &[f64]) -> (f64, f64, f64) {
    if prices.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let series: Vec<f64> = (1..=prices.len())
        .map(|i| ema(&prices[..i], 12) - ema(&prices[..i], 26))
        .collect();
    let macd_value = *series.last().expect("non-empty series");
    let signal = ema(&series, 9);
    (macd_value, signal, macd_value - signal)
}

/// Bollinger bands: SMA middle, `mult` standard deviations out.
/// Returns `(upper, middle, lower, width)` with width relative to middle.
pub fn bollinger(prices: &[f64], period: usize, mult: f64) -> (f64, f64, f64, f64) {
    if prices.is_empty() || period == 0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let n = period.min(prices.len());
    let slice = &prices[prices.len() - n..];
    let middle = slice.iter().sum::<f64>() / n as f64;
    let variance = slice.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / n as f64;
    let sd = variance.sqrt();
    let upper = middle + mult * sd;
    let lower = middle - mult * sd;
    let width = if middle != 0.0 {
        (upper - lower) / middle
    } else {
        0.0
    };
    (upper, middle, lower, width)
}

/// Average true range, approximated as the mean absolute quote-to-quote
/// move over the trailing `period` steps (no OHLC available).
pub fn atr(prices: &[f64], period: usize) -> f64 {
    if prices.len() < 2 || period == 0 {
        return 0.0;
    }
    let n = period.min(prices.len() - 1);
    let slice = &prices[prices.len() - n - 1..];
    slice.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / n as f64
}

/// Simplified directional index over the full window:
/// `|sum(up) - sum(down)| / (sum(up) + sum(down)) * 100`.
pub fn adx(prices: &[f64], period: usize) -> f64 {
    if prices.len() < 2 || period == 0 {
        return 0.0;
    }
    let n = period.min(prices.len() - 1);
    let slice = &prices[prices.len() - n - 1..];
    let (mut up, mut down) = (0.0, 0.0);
    for pair in slice.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            up += delta;
        } else {
            down -= delta;
        }
    }
    let total = up + down;
    if total == 0.0 {
        0.0
    } else {
        (up - down).abs() / total * 100.0
    }
}

fn stochastic_k(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 50.0;
    }
    let n = period.min(prices.len());
    let slice = &prices[prices.len() - n..];
    let close = *slice.last().expect("non-empty slice");
    let min = slice.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = slice.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == min {
        50.0
    } else {
        (close - min) / (max - min) * 100.0
    }
}

/// Stochastic oscillator: `%K` over the trailing window, `%D` as the
/// 3-period smoothing of `%K`. Returns `(k, d)`.
pub fn stochastic(prices: &[f64], period: usize) -> (f64, f64) {
    let k = stochastic_k(prices, period);
    let mut ks = Vec::with_capacity(3);
    for offset in 0..3 {
        if prices.len() > offset {
            ks.push(stochastic_k(&prices[..prices.len() - offset], period));
        }
    }
    let d = if ks.is_empty() {
        k
    } else {
        ks.iter().sum::<f64>() / ks.len() as f64
    };
    (k, d)
}

/// Rate of change against the quote `period` steps back.
pub fn momentum(prices: &[f64], period: usize) -> f64 {
    if prices.len() < period + 1 {
        return 0.0;
    }
    let past = prices[prices.len() - 1 - period];
    let now = prices[prices.len() - 1];
    if past == 0.0 {
        0.0
    } else {
        (now - past) / past
    }
}

/// Coefficient of variation over the trailing window.
pub fn volatility(prices: &[f64], window: usize) -> f64 {
    if prices.is_empty() || window == 0 {
        return 0.0;
    }
    let n = window.min(prices.len());
    let slice = &prices[prices.len() - n..];
    let mean = slice.iter().sum::<f64>() / n as f64;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = slice.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n as f64;
    variance.sqrt() / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_ema_short_series_returns_last_quote() {
        let prices = vec![100.0, 101.0, 102.0];
        assert_eq!(ema(&prices, 9), 102.0);
    }

    #[test]
    fn test_ema_seeds_with_sma() {
        let prices = vec![1.0, 2.0, 3.0];
        // Exactly `period` quotes: EMA equals the seed SMA.
        assert!((ema(&prices, 3) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        assert_eq!(rsi(&rising(20), 14), 100.0);
    }

    #[test]
    fn test_rsi_insufficient_data_is_50() {
        assert_eq!(rsi(&rising(14), 14), 50.0);
        assert_eq!(rsi(&[], 14), 50.0);
    }

    #[test]
    fn test_rsi_all_losses_near_zero() {
        let falling: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        let value = rsi(&falling, 14);
        assert!(value < 1e-9);
    }

    #[test]
    fn test_bollinger_flat_series() {
        let flat = vec![100.0; 25];
        let (upper, middle, lower, width) = bollinger(&flat, 20, 2.0);
        assert_eq!(middle, 100.0);
        assert_eq!(upper, 100.0);
        assert_eq!(lower, 100.0);
        assert_eq!(width, 0.0);
    }

    #[test]
    fn test_bollinger_width_grows_with_dispersion() {
        let mut wavy = Vec::new();
        for i in 0..20 {
            wavy.push(if i % 2 == 0 { 95.0 } else { 105.0 });
        }
        let (_, middle, _, width) = bollinger(&wavy, 20, 2.0);
        assert_eq!(middle, 100.0);
        assert!(width > 0.1);
    }

    #[test]
    fn test_atr_constant_step() {
        // Every step is exactly 1.0.
        assert!((atr(&rising(20), 14) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_adx_extremes() {
        // Pure uptrend: all movement one-directional.
        assert_eq!(adx(&rising(20), 14), 100.0);
        let flat = vec![100.0; 20];
        assert_eq!(adx(&flat, 14), 0.0);
    }

    #[test]
    fn test_stochastic_at_window_top() {
        let (k, d) = stochastic(&rising(20), 14);
        assert_eq!(k, 100.0);
        assert_eq!(d, 100.0);
    }

    #[test]
    fn test_stochastic_flat_is_neutral() {
        let flat = vec![100.0; 20];
        let (k, d) = stochastic(&flat, 14);
        assert_eq!(k, 50.0);
        assert_eq!(d, 50.0);
    }

    #[test]
    fn test_momentum() {
        let prices = rising(20);
        let expected = (119.0 - 109.0) / 109.0;
        assert!((momentum(&prices, 10) - expected).abs() < 1e-12);
        assert_eq!(momentum(&prices[..5], 10), 0.0);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let (macd_value, _signal, _hist) = macd(&rising(40));
        assert!(macd_value > 0.0);
    }

    #[test]
    fn test_volatility_flat_is_zero() {
        let flat = vec![100.0; 20];
        assert_eq!(volatility(&flat, 20), 0.0);
    }
}
