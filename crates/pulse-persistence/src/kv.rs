//! Idempotency KV interface: atomic SET NX EX.

use crate::error::KvError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The distributed idempotency KV. The only operation the core needs is
/// the single atomic primitive.
#[async_trait]
pub trait IdempotencyKv: Send + Sync {
    /// SET key NX EX ttl. `Ok(true)` when the key was absent and is now
    /// claimed; `Ok(false)` when someone else holds it.
    async fn set_nx_ex(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;
}

/// In-memory KV with real TTL expiry, used as a test double for the
/// remote store.
#[derive(Default)]
pub struct InMemoryKv {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl IdempotencyKv for InMemoryKv {
    async fn set_nx_ex(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expiry| *expiry > now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}
