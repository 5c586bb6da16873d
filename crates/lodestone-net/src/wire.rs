//! Process-wide messaging hub.
//!
//! The wire owns one [`ChannelPair`] per channel name: the server endpoint
//! plus one client endpoint per connected peer. Server and client channels
//! with the same name are logically paired but independently owned, and
//! both sides may open a name before the other does.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use lodestone_core::id::PeerId;
use lodestone_core::rate_limit::{BucketTable, RateLimit};

use crate::channel::{ClientChannel, ServerChannel};
use crate::pending::PendingTable;
use crate::subscribers::SubscriberList;

pub(crate) type ServerHandler = dyn Fn(PeerId, &serde_json::Value) + Send + Sync;
pub(crate) type ClientHandler = dyn Fn(&serde_json::Value) + Send + Sync;
pub(crate) type ServerResponder =
    dyn Fn(PeerId, &serde_json::Value) -> serde_json::Value + Send + Sync;
pub(crate) type ClientResponder = dyn Fn(&serde_json::Value) -> serde_json::Value + Send + Sync;

pub(crate) struct ServerEnd {
    pub(crate) buckets: Mutex<BucketTable>,
    pub(crate) subscribers: Mutex<SubscriberList<ServerHandler>>,
    pub(crate) responder: Mutex<Option<Arc<ServerResponder>>>,
    pub(crate) pending: PendingTable,
}

pub(crate) struct ClientEnd {
    pub(crate) peer: PeerId,
    pub(crate) subscribers: Mutex<SubscriberList<ClientHandler>>,
    pub(crate) responder: Mutex<Option<Arc<ClientResponder>>>,
    pub(crate) pending: PendingTable,
}

pub(crate) struct ChannelPair {
    pub(crate) name: String,
    pub(crate) server: ServerEnd,
    pub(crate) clients: Mutex<HashMap<PeerId, Arc<ClientEnd>>>,
}

impl ChannelPair {
    fn new(name: &str, rate_limit: RateLimit) -> Self {
        Self {
            name: name.to_string(),
            server: ServerEnd {
                buckets: Mutex::new(BucketTable::new(rate_limit)),
                subscribers: Mutex::new(SubscriberList::new()),
                responder: Mutex::new(None),
                pending: PendingTable::new(),
            },
            clients: Mutex::new(HashMap::new()),
        }
    }
}

struct WireState {
    default_rate_limit: RateLimit,
    channels: Mutex<HashMap<String, Arc<ChannelPair>>>,
    peers: Mutex<HashSet<PeerId>>,
}

/// The only cross-boundary shared resource in the runtime: everything the
/// two sides exchange flows through channels opened on this hub.
#[derive(Clone)]
pub struct Wire {
    state: Arc<WireState>,
}

impl Wire {
    pub fn new(default_rate_limit: RateLimit) -> Self {
        Self {
            state: Arc::new(WireState {
                default_rate_limit,
                channels: Mutex::new(HashMap::new()),
                peers: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Open (or fetch) the server side of a named channel.
    ///
    /// The channel is a singleton per name: opening an existing name returns
    /// the same channel. An explicit `rate_limit` replaces the channel's
    /// current one; `None` keeps whatever is in effect (the configured
    /// default for a fresh channel).
    pub fn server(&self, name: &str, rate_limit: Option<RateLimit>) -> ServerChannel {
        let pair = self.pair(name);
        if let Some(limit) = rate_limit {
            pair.server.buckets.lock().set_limit(limit);
        }
        ServerChannel::new(pair)
    }

    /// Connect a peer to the wire. The handle opens client channels that
    /// send as this identity.
    pub fn connect(&self, peer: PeerId) -> Peer {
        self.state.peers.lock().insert(peer);
        debug!(target: "net", "{} connected", peer);
        Peer {
            wire: self.clone(),
            id: peer,
        }
    }

    /// Disconnect a peer: its channel endpoints and rate-limiter state are
    /// discarded. Responses it still owes to in-flight invokes are lost and
    /// those invokes run out their timeouts.
    pub fn disconnect(&self, peer: PeerId) {
        self.state.peers.lock().remove(&peer);
        let pairs: Vec<Arc<ChannelPair>> =
            self.state.channels.lock().values().cloned().collect();
        for pair in pairs {
            pair.clients.lock().remove(&peer);
            pair.server.buckets.lock().forget(peer);
        }
        debug!(target: "net", "{} disconnected", peer);
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.state.peers.lock().iter().copied().collect();
        peers.sort();
        peers
    }

    /// Tear down every channel and peer. Called by the orchestrator during
    /// process shutdown, after descriptors have been destroyed.
    pub fn shutdown(&self) {
        self.state.channels.lock().clear();
        self.state.peers.lock().clear();
        debug!(target: "net", "wire shut down");
    }

    fn pair(&self, name: &str) -> Arc<ChannelPair> {
        let mut channels = self.state.channels.lock();
        Arc::clone(channels.entry(name.to_string()).or_insert_with(|| {
            debug!(target: "net", "channel {:?} created", name);
            Arc::new(ChannelPair::new(name, self.state.default_rate_limit))
        }))
    }

    fn client_end(&self, name: &str, peer: PeerId) -> (Arc<ChannelPair>, Arc<ClientEnd>) {
        let pair = self.pair(name);
        let end = {
            let mut clients = pair.clients.lock();
            Arc::clone(clients.entry(peer).or_insert_with(|| {
                Arc::new(ClientEnd {
                    peer,
                    subscribers: Mutex::new(SubscriberList::new()),
                    responder: Mutex::new(None),
                    pending: PendingTable::new(),
                })
            }))
        };
        (pair, end)
    }
}

/// A connected peer's view of the wire.
pub struct Peer {
    wire: Wire,
    id: PeerId,
}

impl Peer {
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Open (or fetch) this peer's client side of a named channel.
    pub fn open(&self, name: &str) -> ClientChannel {
        let (pair, end) = self.wire.client_end(name, self.id);
        ClientChannel::new(pair, end)
    }

    pub fn disconnect(self) {
        self.wire.disconnect(self.id);
    }
}
