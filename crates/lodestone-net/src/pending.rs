//! Correlation table for in-flight invokes.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

/// Maps request ids to the slot awaiting their response.
///
/// A slot is destroyed on first response or when the caller's deadline
/// expires, whichever comes first; a late response to a forgotten id is
/// discarded.
pub(crate) struct PendingTable {
    inner: Mutex<PendingInner>,
}

struct PendingInner {
    next_id: u64,
    slots: HashMap<u64, oneshot::Sender<Value>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(PendingInner {
                next_id: 1,
                slots: HashMap::new(),
            }),
        }
    }

    /// Allocate a request id and the receiver its response arrives on.
    pub(crate) fn register(&self) -> (u64, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.insert(id, tx);
        (id, rx)
    }

    /// Resolve a request; returns `false` if the slot is already gone.
    pub(crate) fn resolve(&self, id: u64, response: Value) -> bool {
        let slot = self.inner.lock().slots.remove(&id);
        match slot {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop the slot for a request whose deadline expired.
    pub(crate) fn forget(&self, id: u64) {
        self.inner.lock().slots.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.inner.lock().slots.len()
    }
}
