//! Market data adapter: validate, dedup, queue, fan out.
//!
//! Ticks flow in from the broker client, are schema-validated, deduped per
//! market, annotated with rolling volatility, and buffered in the bounded
//! queue. A cooperative drainer empties the queue on a fixed cadence and
//! broadcasts to consumers; it never re-enters itself.

use crate::queue::TickQueue;
use crate::volatility::RollingVolatility;
use dashmap::DashMap;
use parking_lot::Mutex;
use pulse_core::Tick;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub queue_capacity: usize,
    pub overflow_drop: usize,
    pub batch_interval_ms: u64,
    pub volatility_window: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            overflow_drop: 10,
            batch_interval_ms: 50,
            volatility_window: 20,
        }
    }
}

/// Events fanned out to consumers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A validated, deduplicated, volatility-annotated tick.
    TickReady(Tick),
    /// The bounded queue shed old ticks to absorb a burst.
    QueueOverflow { dropped: usize },
}

/// Monotonic counters for observability and tests.
#[derive(Debug, Default)]
pub struct FeedStats {
    pub ticks_received: AtomicU64,
    pub ticks_delivered: AtomicU64,
    pub ticks_dropped_duplicate: AtomicU64,
    pub ticks_dropped_invalid: AtomicU64,
    pub ticks_dropped_overflow: AtomicU64,
}

impl FeedStats {
    /// Total dropped for any reason.
    pub fn ticks_dropped(&self) -> u64 {
        self.ticks_dropped_duplicate.load(Ordering::Relaxed)
            + self.ticks_dropped_invalid.load(Ordering::Relaxed)
            + self.ticks_dropped_overflow.load(Ordering::Relaxed)
    }
}

/// The market data pipeline stage.
pub struct MarketDataAdapter {
    config: FeedConfig,
    stats: FeedStats,
    queue: Mutex<TickQueue>,
    last_epoch: DashMap<String, i64>,
    volatility: DashMap<String, RollingVolatility>,
    out: broadcast::Sender<FeedEvent>,
    draining: AtomicBool,
}

impl MarketDataAdapter {
    pub fn new(config: FeedConfig) -> Self {
        let queue = TickQueue::new(config.queue_capacity, config.overflow_drop);
        let (out, _) = broadcast::channel(config.queue_capacity.max(16) * 4);
        Self {
            config,
            stats: FeedStats::default(),
            queue: Mutex::new(queue),
            last_epoch: DashMap::new(),
            volatility: DashMap::new(),
            out,
            draining: AtomicBool::new(false),
        }
    }

    /// Subscribe to the fan-out stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.out.subscribe()
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    /// Number of ticks currently buffered.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Ingest one tick from the broker client.
    ///
    /// Invalid ticks are counted and dropped; stale epochs per market are
    /// counted and dropped; survivors are volatility-annotated and queued.
    pub fn ingest(&self, mut tick: Tick) {
        self.stats.ticks_received.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = tick.validate() {
            self.stats
                .ticks_dropped_invalid
                .fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "invalid tick dropped");
            return;
        }

        // Per-market monotonic dedup.
        {
            let mut entry = self.last_epoch.entry(tick.market.clone()).or_insert(0);
            if tick.epoch <= *entry {
                self.stats
                    .ticks_dropped_duplicate
                    .fetch_add(1, Ordering::Relaxed);
                debug!(market = %tick.market, epoch = tick.epoch, "duplicate tick dropped");
                return;
            }
            *entry = tick.epoch;
        }

        // Rolling volatility annotation.
        let vol = self
            .volatility
            .entry(tick.market.clone())
            .or_insert_with(|| RollingVolatility::new(self.config.volatility_window))
            .push(tick.quote);
        tick.volatility = vol;

        let dropped = self.queue.lock().push(tick);
        if dropped > 0 {
            self.stats
                .ticks_dropped_overflow
                .fetch_add(dropped as u64, Ordering::Relaxed);
            warn!(dropped, "tick queue overflow, oldest discarded");
            let _ = self.out.send(FeedEvent::QueueOverflow { dropped });
        }
    }

    /// Drain the queue to empty, delivering each tick to subscribers.
    ///
    /// Non-reentrant: a second call while a drain is in progress returns
    /// immediately without touching the queue.
    pub fn drain(&self) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let tick = self.queue.lock().pop();
            match tick {
                Some(tick) => {
                    self.stats.ticks_delivered.fetch_add(1, Ordering::Relaxed);
                    let _ = self.out.send(FeedEvent::TickReady(tick));
                }
                None => break,
            }
        }
        self.draining.store(false, Ordering::Release);
    }

    /// Discard everything buffered (shutdown path).
    pub fn drop_queue(&self) {
        self.queue.lock().clear();
    }

    /// Spawn the cooperative drainer: drains at most once per batch
    /// interval until shutdown flips.
    pub fn spawn_drainer(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        let interval = Duration::from_millis(adapter.config.batch_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => adapter.drain(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            adapter.drop_queue();
                            break;
                        }
                    }
                }
            }
        })
    }
}
