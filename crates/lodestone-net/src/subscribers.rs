//! Ordered subscriber lists with snapshot dispatch.

use std::sync::Arc;

/// Callbacks registered on one channel endpoint, in registration order.
///
/// Dispatch works on a snapshot: a handler added while a broadcast is being
/// delivered is not called for that broadcast.
pub(crate) struct SubscriberList<F: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<F>)>,
}

impl<F: ?Sized> SubscriberList<F> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, handler: Arc<F>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.iter().map(|(_, h)| Arc::clone(h)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by `subscribe`; call [`Subscription::unsubscribe`] to
/// deregister the handler. Dropping the handle leaves the handler in place.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
