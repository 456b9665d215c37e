//! Market data pipeline.
//!
//! Normalizes ticks coming off the broker client, enforces per-market
//! monotonic delivery, absorbs bursts in a bounded queue with a
//! recency-preserving overflow policy, and fans out to consumers through
//! a cooperative drainer.

pub mod adapter;
pub mod queue;
pub mod volatility;

pub use adapter::{FeedConfig, FeedEvent, FeedStats, MarketDataAdapter};
pub use queue::TickQueue;
pub use volatility::RollingVolatility;
