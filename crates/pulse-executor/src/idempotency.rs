//! Distributed idempotency with an in-process fallback.
//!
//! One approved check executes at most once per TTL, across processes
//! when the KV is reachable and within this process when it is not. The
//! fallback carries the same TTL plus a hard entry cap so a KV outage
//! cannot grow memory without bound.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_persistence::IdempotencyKv;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// `user_id:market:signal_timestamp_millis`.
pub fn idempotency_key(user_id: &str, market: &str, timestamp: DateTime<Utc>) -> String {
    format!("{user_id}:{market}:{}", timestamp.timestamp_millis())
}

/// In-process TTL map with an eviction guard.
pub struct LocalIdempotencyMap {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, Instant>>,
}

impl LocalIdempotencyMap {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the key. `false` means someone already holds it within TTL.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expiry| *expiry > now);

        if entries.contains_key(key) {
            return false;
        }
        if entries.len() >= self.max_entries {
            // Shed the entry closest to expiry.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, expiry)| **expiry)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(key.to_string(), now + self.ttl);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// The gate the executor consults before any broker interaction.
pub struct IdempotencyGate {
    kv: Option<Arc<dyn IdempotencyKv>>,
    fallback: LocalIdempotencyMap,
    ttl: Duration,
}

impl IdempotencyGate {
    const FALLBACK_CAP: usize = 1000;

    pub fn new(kv: Option<Arc<dyn IdempotencyKv>>, ttl: Duration) -> Self {
        Self {
            kv,
            fallback: LocalIdempotencyMap::new(ttl, Self::FALLBACK_CAP),
            ttl,
        }
    }

    /// Atomically claim the key: the KV when reachable, the in-process
    /// map when not. Degrading keeps the pipeline trading.
    pub async fn try_acquire(&self, key: &str) -> bool {
        if let Some(kv) = &self.kv {
            match kv.set_nx_ex(key, self.ttl).await {
                Ok(claimed) => {
                    debug!(key, claimed, "idempotency key via kv");
                    return claimed;
                }
                Err(e) => {
                    warn!(error = %e, "idempotency kv unreachable, using in-process fallback");
                }
            }
        }
        self.fallback.try_acquire(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse_persistence::{InMemoryKv, KvError};

    #[test]
    fn test_key_format() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            idempotency_key("u1", "R_100", ts),
            "u1:R_100:1700000000000"
        );
    }

    #[test]
    fn test_local_map_claims_once() {
        let map = LocalIdempotencyMap::new(Duration::from_secs(60), 1000);
        assert!(map.try_acquire("k1"));
        assert!(!map.try_acquire("k1"));
        assert!(map.try_acquire("k2"));
    }

    #[test]
    fn test_local_map_ttl_expiry() {
        let map = LocalIdempotencyMap::new(Duration::from_millis(20), 1000);
        assert!(map.try_acquire("k1"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(map.try_acquire("k1"));
    }

    #[test]
    fn test_local_map_eviction_guard() {
        let map = LocalIdempotencyMap::new(Duration::from_secs(60), 100);
        for i in 0..150 {
            assert!(map.try_acquire(&format!("k{i}")));
        }
        assert!(map.len() <= 100);
    }

    #[tokio::test]
    async fn test_gate_uses_kv() {
        let kv = Arc::new(InMemoryKv::new());
        let gate = IdempotencyGate::new(Some(kv.clone()), Duration::from_secs(60));
        assert!(gate.try_acquire("k1").await);
        assert!(!gate.try_acquire("k1").await);
        assert_eq!(kv.len(), 1);
    }

    struct BrokenKv;

    #[async_trait]
    impl IdempotencyKv for BrokenKv {
        async fn set_nx_ex(&self, _key: &str, _ttl: Duration) -> Result<bool, KvError> {
            Err(KvError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_gate_degrades_to_fallback() {
        let gate = IdempotencyGate::new(Some(Arc::new(BrokenKv)), Duration::from_secs(60));
        assert!(gate.try_acquire("k1").await);
        assert!(!gate.try_acquire("k1").await);
    }

    #[tokio::test]
    async fn test_gate_without_kv() {
        let gate = IdempotencyGate::new(None, Duration::from_secs(60));
        assert!(gate.try_acquire("k1").await);
        assert!(!gate.try_acquire("k1").await);
    }
}
