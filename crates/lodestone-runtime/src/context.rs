//! The process-wide runtime context.
//!
//! One explicit context object is constructed at boot and handed by
//! reference into every lifecycle hook; nothing in the runtime is an
//! ambient global. It carries the resolved config, the wire, the component
//! table, the utility namespace and the class-attachment registry.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use lodestone_core::config::RuntimeConfig;
use lodestone_core::id::{PeerId, Side};
use lodestone_core::rate_limit::RateLimit;
use lodestone_net::{ClientChannel, Peer, ServerChannel, Wire};

use crate::attach::AttachmentRegistry;
use crate::error::ComponentError;
use crate::module::Component;

/// A value exposed through the flat utility namespace.
pub type UtilityValue = Arc<dyn Any + Send + Sync>;

pub struct RuntimeContext {
    side: Side,
    config: RuntimeConfig,
    wire: Wire,
    /// The local peer connection on a client-side boot.
    local_peer: Option<Peer>,
    components: RwLock<HashMap<String, Arc<dyn Component>>>,
    utilities: RwLock<HashMap<String, UtilityValue>>,
    attachments: AttachmentRegistry,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("side", &self.side)
            .field("components", &self.components.read().len())
            .field("utilities", &self.utilities.read().len())
            .finish_non_exhaustive()
    }
}

impl RuntimeContext {
    pub(crate) fn new(
        side: Side,
        config: RuntimeConfig,
        wire: Wire,
        local_peer: Option<Peer>,
    ) -> Self {
        Self {
            side,
            config,
            wire,
            local_peer,
            components: RwLock::new(HashMap::new()),
            utilities: RwLock::new(HashMap::new()),
            attachments: AttachmentRegistry::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn wire(&self) -> &Wire {
        &self.wire
    }

    /// Identity this side sends as, present only on client boots.
    pub fn local_peer_id(&self) -> Option<PeerId> {
        self.local_peer.as_ref().map(Peer::id)
    }

    /// Open (or fetch) the server side of a named channel. Without an
    /// explicit rate limit the configured `Net.DefaultRateLimit` applies.
    pub fn server_channel(&self, name: &str, rate_limit: Option<RateLimit>) -> ServerChannel {
        self.wire.server(name, rate_limit)
    }

    /// Open (or fetch) this side's client channel. `None` on a server-side
    /// boot, which has no peer identity to send as.
    pub fn client_channel(&self, name: &str) -> Option<ClientChannel> {
        self.local_peer.as_ref().map(|peer| peer.open(name))
    }

    /// Look up a component by identity. Fails with `NotFound` until the
    /// component's init has completed.
    pub fn component(&self, identity: &str) -> Result<Arc<dyn Component>, ComponentError> {
        self.components
            .read()
            .get(identity)
            .cloned()
            .ok_or_else(|| ComponentError::NotFound {
                identity: identity.to_string(),
            })
    }

    pub(crate) fn record_component(&self, component: Arc<dyn Component>) {
        let identity = component.identity().to_string();
        debug!(target: "lifecycle", "component {:?} recorded", identity);
        self.components.write().insert(identity, component);
    }

    /// Expose a value in the flat utility namespace. Last registration wins
    /// on a name collision; that is documented behavior, not an error.
    pub fn expose_utility(&self, name: impl Into<String>, value: UtilityValue) {
        let name = name.into();
        let mut utilities = self.utilities.write();
        if utilities.contains_key(&name) {
            debug!(target: "lifecycle", "utility {:?} re-registered, last wins", name);
        }
        utilities.insert(name, value);
    }

    pub fn utility(&self, name: &str) -> Option<UtilityValue> {
        self.utilities.read().get(name).cloned()
    }

    /// Typed utility lookup; `None` if absent or of a different type.
    pub fn utility_of<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.utility(name).and_then(|value| value.downcast::<T>().ok())
    }

    pub fn attachments(&self) -> &AttachmentRegistry {
        &self.attachments
    }
}
