//! Server and client channel endpoints.
//!
//! Handlers run synchronously on the dispatching side, against a snapshot
//! of the subscriber list taken before the first call. `invoke` is the only
//! suspension point: the caller parks on its pending slot until the first
//! response arrives or the timeout elapses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use lodestone_core::id::PeerId;

use crate::error::NetError;
use crate::subscribers::Subscription;
use crate::wire::{ChannelPair, ClientEnd, ClientHandler, ClientResponder, ServerHandler, ServerResponder};

/// Server side of a named channel.
#[derive(Clone)]
pub struct ServerChannel {
    pair: Arc<ChannelPair>,
}

impl ServerChannel {
    pub(crate) fn new(pair: Arc<ChannelPair>) -> Self {
        Self { pair }
    }

    pub fn name(&self) -> &str {
        &self.pair.name
    }

    /// Register a handler for messages fired by peers. The handler receives
    /// the sender's identity and the payload.
    pub fn subscribe(&self, handler: impl Fn(PeerId, &Value) + Send + Sync + 'static) -> Subscription {
        let handler: Arc<ServerHandler> = Arc::new(handler);
        let id = self.pair.server.subscribers.lock().add(handler);
        let pair = Arc::clone(&self.pair);
        Subscription::new(move || {
            pair.server.subscribers.lock().remove(id);
        })
    }

    /// Register the responder for invokes arriving from peers. Replaces any
    /// previous responder.
    pub fn on_invoke(&self, responder: impl Fn(PeerId, &Value) -> Value + Send + Sync + 'static) {
        *self.pair.server.responder.lock() = Some(Arc::new(responder));
    }

    /// Deliver a payload to one peer. With `reliable = false` the transport
    /// may drop the message silently; a fire to a peer that never opened
    /// this channel is dropped either way.
    pub fn fire(&self, reliable: bool, target: PeerId, payload: Value) {
        let end = self.pair.clients.lock().get(&target).cloned();
        match end {
            Some(end) => dispatch_to_client(&end, &payload),
            None => {
                debug!(
                    target: "net",
                    "fire on {:?} dropped, {} has no endpoint (reliable={})",
                    self.pair.name, target, reliable
                );
            }
        }
    }

    /// Deliver a payload to every peer that opened this channel.
    pub fn fire_all(&self, _reliable: bool, payload: Value) {
        for end in self.client_snapshot() {
            dispatch_to_client(&end, &payload);
        }
    }

    /// Deliver a payload to every peer except `excluded`.
    pub fn fire_except(&self, _reliable: bool, excluded: PeerId, payload: Value) {
        for end in self.client_snapshot() {
            if end.peer != excluded {
                dispatch_to_client(&end, &payload);
            }
        }
    }

    /// Send a correlated request to one peer and await its response.
    ///
    /// Resolves to `Ok(None)` if no response arrives before `timeout`; the
    /// expired timeout is the only cancellation.
    pub async fn invoke(
        &self,
        timeout: Duration,
        target: PeerId,
        payload: Value,
    ) -> Result<Option<Value>, NetError> {
        let (request_id, rx) = self.pair.server.pending.register();

        let responder = self
            .pair
            .clients
            .lock()
            .get(&target)
            .and_then(|end| end.responder.lock().clone());
        if let Some(responder) = responder {
            let response = responder(&payload);
            self.pair.server.pending.resolve(request_id, response);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            _ => {
                self.pair.server.pending.forget(request_id);
                debug!(
                    target: "net",
                    "invoke {} on {:?} to {} timed out",
                    request_id, self.pair.name, target
                );
                Ok(None)
            }
        }
    }

    /// Registered subscriber count, mostly useful in tests and diagnostics.
    pub fn subscriber_count(&self) -> usize {
        self.pair.server.subscribers.lock().len()
    }

    fn client_snapshot(&self) -> Vec<Arc<ClientEnd>> {
        self.pair.clients.lock().values().cloned().collect()
    }
}

fn dispatch_to_client(end: &ClientEnd, payload: &Value) {
    // Snapshot under the lock, call outside it: a handler subscribed during
    // this broadcast is not invoked for it, and handlers may re-enter the
    // channel freely.
    let handlers = end.subscribers.lock().snapshot();
    for handler in handlers {
        handler(payload);
    }
}

/// A peer's side of a named channel. The remote end is implicitly the
/// server, so fire and invoke take no target.
#[derive(Clone)]
pub struct ClientChannel {
    pair: Arc<ChannelPair>,
    end: Arc<ClientEnd>,
}

impl ClientChannel {
    pub(crate) fn new(pair: Arc<ChannelPair>, end: Arc<ClientEnd>) -> Self {
        Self { pair, end }
    }

    pub fn name(&self) -> &str {
        &self.pair.name
    }

    pub fn peer(&self) -> PeerId {
        self.end.peer
    }

    /// Register a handler for payloads the server fires at this peer.
    pub fn subscribe(&self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        let handler: Arc<ClientHandler> = Arc::new(handler);
        let id = self.end.subscribers.lock().add(handler);
        let end = Arc::clone(&self.end);
        Subscription::new(move || {
            end.subscribers.lock().remove(id);
        })
    }

    /// Register the responder for server-initiated invokes.
    pub fn on_invoke(&self, responder: impl Fn(&Value) -> Value + Send + Sync + 'static) {
        *self.end.responder.lock() = Some(Arc::new(responder));
    }

    /// Fire a payload at the server. Subject to this sender's token bucket:
    /// an over-limit message is dropped silently, reliable or not.
    pub fn fire(&self, reliable: bool, payload: Value) {
        if !self.admit() {
            debug!(
                target: "net",
                "fire on {:?} from {} rate limited, dropped (reliable={})",
                self.pair.name, self.end.peer, reliable
            );
            return;
        }
        let handlers = self.pair.server.subscribers.lock().snapshot();
        for handler in handlers {
            handler(self.end.peer, &payload);
        }
    }

    /// Send a correlated request to the server and await its response.
    ///
    /// An over-limit request fails with [`NetError::RateLimited`] right
    /// away instead of leaving the caller to wait out the timeout. With no
    /// response before `timeout`, resolves to `Ok(None)`.
    pub async fn invoke(
        &self,
        timeout: Duration,
        payload: Value,
    ) -> Result<Option<Value>, NetError> {
        if !self.admit() {
            debug!(
                target: "net",
                "invoke on {:?} from {} rate limited, rejected",
                self.pair.name, self.end.peer
            );
            return Err(NetError::RateLimited);
        }

        let (request_id, rx) = self.end.pending.register();

        let responder = self.pair.server.responder.lock().clone();
        if let Some(responder) = responder {
            let response = responder(self.end.peer, &payload);
            self.end.pending.resolve(request_id, response);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            _ => {
                self.end.pending.forget(request_id);
                debug!(
                    target: "net",
                    "invoke {} on {:?} from {} timed out",
                    request_id, self.pair.name, self.end.peer
                );
                Ok(None)
            }
        }
    }

    fn admit(&self) -> bool {
        self.pair
            .server
            .buckets
            .lock()
            .try_admit(self.end.peer, Instant::now())
    }
}
