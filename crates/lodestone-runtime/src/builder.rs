//! Builder for [`Runtime`].
//!
//! The builder is the manifest: the host's discovery step feeds descriptor
//! lists in, and registration order is the deterministic tie-breaker for
//! equal priorities. The runtime itself never scans the filesystem.

use lodestone_core::config::RuntimeConfig;
use lodestone_core::id::PeerId;
use lodestone_net::Wire;

use crate::attach::ClassDescriptor;
use crate::context::UtilityValue;
use crate::module::{Component, Module};
use crate::orchestrator::{Descriptor, Runtime};

pub struct RuntimeBuilder {
    config: RuntimeConfig,
    wire: Option<Wire>,
    client_peer: PeerId,
    descriptors: Vec<Descriptor>,
    classes: Vec<ClassDescriptor>,
    utilities: Vec<(String, UtilityValue)>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            wire: None,
            client_peer: PeerId(1),
            descriptors: Vec::new(),
            classes: Vec::new(),
            utilities: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing wire, e.g. when the server and client sides of a
    /// test run in one process.
    pub fn with_wire(mut self, wire: Wire) -> Self {
        self.wire = Some(wire);
        self
    }

    /// Peer identity a client-side boot connects as.
    pub fn with_client_peer(mut self, peer: PeerId) -> Self {
        self.client_peer = peer;
        self
    }

    pub fn module(mut self, module: impl Module) -> Self {
        self.descriptors
            .push(Descriptor::Module(std::sync::Arc::new(module)));
        self
    }

    pub fn component(mut self, component: impl Component) -> Self {
        self.descriptors
            .push(Descriptor::Component(std::sync::Arc::new(component)));
        self
    }

    /// Register a class in the attachment registry at boot.
    pub fn class(mut self, descriptor: ClassDescriptor) -> Self {
        self.classes.push(descriptor);
        self
    }

    /// Expose a value in the utility namespace at boot.
    pub fn utility(mut self, name: impl Into<String>, value: UtilityValue) -> Self {
        self.utilities.push((name.into(), value));
        self
    }

    pub fn build(self) -> Runtime {
        Runtime::new(
            self.config,
            self.wire,
            self.client_peer,
            self.descriptors,
            self.classes,
            self.utilities,
        )
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
