//! Prometheus metrics for the trading pipeline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally: a registration
//! failure means duplicate metric names, which should crash at startup
//! rather than run blind. These panics only occur during static
//! initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_int_counter, CounterVec,
    Gauge, Histogram, IntCounter,
};

/// Broker WebSocket connection state (1 = connected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pulse_ws_connected", "Broker WS connection state (1=connected)").unwrap()
});

/// Heartbeat round-trip latency in milliseconds.
pub static HEARTBEAT_RTT_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "pulse_heartbeat_rtt_ms",
        "Broker heartbeat round-trip latency in milliseconds",
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Circuit breaker opens.
pub static CIRCUIT_OPENED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pulse_circuit_opened_total",
        "Times the connection circuit breaker opened"
    )
    .unwrap()
});

/// Ticks dropped in the feed, by reason (invalid/duplicate/overflow).
pub static TICKS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_ticks_dropped_total",
        "Ticks dropped by the market data pipeline",
        &["reason"]
    )
    .unwrap()
});

/// Signals emitted, by market and direction.
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_signals_total",
        "Signals emitted by the signal engine",
        &["market", "kind"]
    )
    .unwrap()
});

/// Risk check outcomes, by result and rejection reason.
pub static RISK_CHECKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_risk_checks_total",
        "Risk guard evaluations",
        &["result", "reason"]
    )
    .unwrap()
});

/// Trade events, by terminal status.
pub static TRADES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_trades_total",
        "Trade lifecycle events",
        &["status"]
    )
    .unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        // Touching each Lazy exercises registration; duplicates would panic.
        WS_CONNECTED.set(1.0);
        HEARTBEAT_RTT_MS.observe(12.0);
        CIRCUIT_OPENED_TOTAL.inc();
        TICKS_DROPPED_TOTAL.with_label_values(&["duplicate"]).inc();
        SIGNALS_TOTAL.with_label_values(&["R_100", "CALL"]).inc();
        RISK_CHECKS_TOTAL
            .with_label_values(&["REJECTED", "SESSION_PAUSED"])
            .inc();
        TRADES_TOTAL.with_label_values(&["SUBMITTED"]).inc();
    }
}
