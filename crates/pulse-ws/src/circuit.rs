//! Failure-windowed circuit breaker for connection management.
//!
//! Close/error timestamps are recorded in a sliding window; once the count
//! reaches the threshold the breaker opens: new connects are refused and
//! reconnects cancelled. The breaker auto-resets after a cool-down.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct CircuitInner {
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
}

/// Sliding-window circuit breaker.
pub struct CircuitBreaker {
    window: Duration,
    threshold: usize,
    reset_after: Duration,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(window: Duration, threshold: usize, reset_after: Duration) -> Self {
        Self {
            window,
            threshold,
            reset_after,
            inner: Mutex::new(CircuitInner {
                failures: VecDeque::new(),
                opened_at: None,
            }),
        }
    }

    fn prune(&self, inner: &mut CircuitInner, now: Instant) {
        while let Some(front) = inner.failures.front() {
            if now.duration_since(*front) > self.window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a close/error. Returns true when exactly this failure opened
    /// the breaker.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.prune(&mut inner, now);
        inner.failures.push_back(now);

        if inner.opened_at.is_none() && inner.failures.len() >= self.threshold {
            inner.opened_at = Some(now);
            return true;
        }
        false
    }

    /// Whether the breaker currently refuses connects. Auto-resets once the
    /// cool-down has elapsed.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.opened_at {
            Some(opened) if opened.elapsed() >= self.reset_after => {
                inner.opened_at = None;
                inner.failures.clear();
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Failures currently inside the window.
    pub fn failure_count(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.prune(&mut inner, now);
        inner.failures.len()
    }

    /// Force-close the breaker and clear the window.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.opened_at = None;
        inner.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(Duration::from_secs(30), 5, Duration::from_secs(30))
    }

    #[test]
    fn test_opens_at_exactly_the_threshold() {
        let cb = breaker();
        for _ in 0..4 {
            assert!(!cb.record_failure());
            assert!(!cb.is_open());
        }
        // 5th failure inside the window opens the breaker.
        assert!(cb.record_failure());
        assert!(cb.is_open());
        assert_eq!(cb.failure_count(), 5);
    }

    #[test]
    fn test_open_is_reported_once() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        // Further failures while open do not re-open.
        assert!(!cb.record_failure());
        assert!(cb.is_open());
    }

    #[test]
    fn test_auto_reset_after_cooldown() {
        let cb = CircuitBreaker::new(Duration::from_millis(50), 2, Duration::from_millis(30));
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_open());

        std::thread::sleep(Duration::from_millis(40));
        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_window_pruning() {
        let cb = CircuitBreaker::new(Duration::from_millis(20), 5, Duration::from_secs(30));
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        // Old failures fell out of the window.
        assert_eq!(cb.failure_count(), 0);
        assert!(!cb.record_failure());
        assert!(!cb.is_open());
    }

    #[test]
    fn test_manual_reset() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        assert!(cb.is_open());
        cb.reset();
        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 0);
    }
}
