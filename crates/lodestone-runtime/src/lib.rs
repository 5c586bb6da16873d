/// Lifecycle orchestration for the lodestone runtime
///
/// The runtime discovers nothing on its own: the host feeds it a manifest
/// of modules, components, classes and utilities through
/// [`Runtime::builder`], then boots one side with [`Runtime::start`]. Boot
/// runs all `on_init` hooks in priority order, joins them at a barrier,
/// then runs all `on_start` hooks; `shutdown` destroys in reverse.
pub mod attach;
pub mod builder;
pub mod context;
pub mod error;
pub mod module;
mod orchestrator;

pub use attach::{
    AttachmentRegistry, ClassDescriptor, ClassHooks, ClassInstance, LifecyclePhase,
};
pub use builder::RuntimeBuilder;
pub use context::{RuntimeContext, UtilityValue};
pub use error::{AttachError, BootError, ComponentError, Phase};
pub use module::{Component, Module};
pub use orchestrator::Runtime;

// The core and net surfaces modules touch from lifecycle hooks.
pub use lodestone_core::cleanup::{CleanupStack, Dispose};
pub use lodestone_core::config::RuntimeConfig;
pub use lodestone_core::id::{PeerId, Scope, Side, SuspendPolicy, TargetId};
pub use lodestone_core::init_logging;
pub use lodestone_core::rate_limit::RateLimit;
pub use lodestone_net::{ClientChannel, NetError, ServerChannel, Subscription, Wire};
