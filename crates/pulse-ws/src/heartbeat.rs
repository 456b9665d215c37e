//! Heartbeat management for the broker connection.
//!
//! A ping is sent every interval; a dead-man timer arms with each ping and
//! each pong clears it. If the timer expires the socket is closed with
//! code 4000 and the close is treated as a failure.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Close code used when the dead-man timer fires.
pub const HEARTBEAT_CLOSE_CODE: u16 = 4000;

/// Heartbeat state for one connection.
pub struct HeartbeatManager {
    interval_ms: u64,
    timeout_ms: u64,
    last_ping: RwLock<Option<DateTime<Utc>>>,
    last_pong: RwLock<Option<DateTime<Utc>>>,
    waiting_for_pong: RwLock<bool>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            last_ping: RwLock::new(None),
            last_pong: RwLock::new(None),
            waiting_for_pong: RwLock::new(false),
        }
    }

    /// Reset state (called on connection open).
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_pong.write() = None;
        *self.waiting_for_pong.write() = false;
    }

    /// Record that a ping was sent; arms the dead-man timer.
    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Utc::now());
        *self.waiting_for_pong.write() = true;
    }

    /// Record a pong; clears the dead-man timer and returns the measured
    /// round-trip latency in milliseconds.
    pub fn record_pong(&self) -> Option<i64> {
        let now = Utc::now();
        *self.last_pong.write() = Some(now);
        *self.waiting_for_pong.write() = false;

        let rtt = self
            .last_ping
            .read()
            .map(|ping| (now - ping).num_milliseconds());
        if let Some(rtt_ms) = rtt {
            debug!(rtt_ms, "heartbeat pong");
        }
        rtt
    }

    /// Whether the dead-man timer has expired.
    pub fn is_timed_out(&self) -> bool {
        if !*self.waiting_for_pong.read() {
            return false;
        }
        match *self.last_ping.read() {
            Some(ping) => (Utc::now() - ping).num_milliseconds() > self.timeout_ms as i64,
            None => false,
        }
    }

    /// Whether a ping is due. Never true while a pong is outstanding.
    pub fn should_send_ping(&self) -> bool {
        if *self.waiting_for_pong.read() {
            return false;
        }
        match *self.last_ping.read() {
            Some(ping) => (Utc::now() - ping).num_milliseconds() >= self.interval_ms as i64,
            None => true,
        }
    }

    /// Sleep until the next heartbeat check.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(Duration::from_millis(self.interval_ms / 2)).await;
    }
}
