//! Request/response correlation.
//!
//! Every outbound request carries a monotonically increasing `req_id`.
//! Inbound frames carrying a `req_id` resolve the matching pending slot;
//! on disconnect all pending slots fail together.

use crate::error::{WsError, WsResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Pending request table keyed by `req_id`.
pub struct PendingRequests {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<WsResult<serde_json::Value>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next request id. Never repeats within a client.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Register a pending slot for `req_id`.
    pub fn register(&self, req_id: u64) -> oneshot::Receiver<WsResult<serde_json::Value>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(req_id, tx);
        rx
    }

    /// Resolve a pending request. Returns false when nothing was waiting.
    pub fn resolve(&self, req_id: u64, result: WsResult<serde_json::Value>) -> bool {
        match self.pending.lock().remove(&req_id) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Drop a pending slot without resolving it (request timeout path).
    pub fn abandon(&self, req_id: u64) {
        self.pending.lock().remove(&req_id);
    }

    /// Fail every pending request, e.g. with a connection-closed error.
    pub fn fail_all(&self, make_err: impl Fn() -> WsError) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(make_err()));
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
