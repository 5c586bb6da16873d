//! Class-attachment registry: per-target behavior instances with their own
//! lifecycle and cleanup stack.
//!
//! The registry exclusively owns every live instance; `target` is a
//! non-owning back-reference. The host engine notifies the registry through
//! [`AttachmentRegistry::target_destroyed`] when a target goes away, since
//! nothing here keeps the external handle alive.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::poll_immediate;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, error};

use lodestone_core::cleanup::CleanupStack;
use lodestone_core::id::{SuspendPolicy, TargetId};

use crate::error::{AttachError, Phase};

/// Lifecycle hooks of a class. All slots are optional no-ops by default.
#[async_trait]
pub trait ClassHooks: Send + Sync + 'static {
    async fn on_init(
        &self,
        _instance: &Arc<ClassInstance>,
        _extra: Option<&Value>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_start(&self, _instance: &Arc<ClassInstance>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_destroy(&self, _instance: &Arc<ClassInstance>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Static declaration of a class: identity, default state and hooks.
pub struct ClassDescriptor {
    identity: String,
    defaults: Map<String, Value>,
    suspend_policy: SuspendPolicy,
    hooks: Arc<dyn ClassHooks>,
}

impl ClassDescriptor {
    pub fn new(identity: impl Into<String>, hooks: impl ClassHooks) -> Self {
        Self {
            identity: identity.into(),
            defaults: Map::new(),
            suspend_policy: SuspendPolicy::AllowYield,
            hooks: Arc::new(hooks),
        }
    }

    /// Default state deep-copied into every assigned instance.
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_suspend_policy(mut self, policy: SuspendPolicy) -> Self {
        self.suspend_policy = policy;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Created,
    Initialized,
    Started,
    Destroyed,
}

/// A live class instance attached to one target.
pub struct ClassInstance {
    descriptor: Arc<ClassDescriptor>,
    target: TargetId,
    state: Mutex<Map<String, Value>>,
    cleanup: CleanupStack,
    phase: Mutex<LifecyclePhase>,
}

impl std::fmt::Debug for ClassInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassInstance")
            .field("class", &self.descriptor.identity)
            .field("target", &self.target)
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl ClassInstance {
    pub fn class_identity(&self) -> &str {
        &self.descriptor.identity
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    /// The instance's cleanup stack; hooks `give` resources here and the
    /// registry drains it on destroy.
    pub fn cleanup(&self) -> &CleanupStack {
        &self.cleanup
    }

    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.lock()
    }

    pub fn state_get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    pub fn state_set(&self, key: impl Into<String>, value: Value) {
        self.state.lock().insert(key.into(), value);
    }

    /// Run a closure against the full state map.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.state.lock())
    }
}

/// Maps external targets to their attached class instances.
pub struct AttachmentRegistry {
    classes: RwLock<HashMap<String, Arc<ClassDescriptor>>>,
    attached: Mutex<HashMap<TargetId, HashMap<String, Arc<ClassInstance>>>>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            attached: Mutex::new(HashMap::new()),
        }
    }

    /// Register a named class. Duplicate identities are rejected.
    pub fn register(&self, descriptor: ClassDescriptor) -> Result<(), AttachError> {
        let mut classes = self.classes.write();
        if classes.contains_key(&descriptor.identity) {
            return Err(AttachError::DuplicateClass {
                identity: descriptor.identity,
            });
        }
        debug!(target: "attach", "class {:?} registered", descriptor.identity);
        classes.insert(descriptor.identity.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Attach a registered class to a target and run it through
    /// init and start.
    pub async fn assign(
        &self,
        class_identity: &str,
        target: TargetId,
        extra: Option<Value>,
    ) -> Result<Arc<ClassInstance>, AttachError> {
        let descriptor = self
            .classes
            .read()
            .get(class_identity)
            .cloned()
            .ok_or_else(|| AttachError::UnknownClass {
                identity: class_identity.to_string(),
            })?;
        self.assign_with(descriptor, target, extra).await
    }

    /// Attach an ad-hoc descriptor, bypassing the named registry but
    /// following the identical lifecycle rules.
    pub async fn assign_with(
        &self,
        descriptor: Arc<ClassDescriptor>,
        target: TargetId,
        extra: Option<Value>,
    ) -> Result<Arc<ClassInstance>, AttachError> {
        let instance = Arc::new(ClassInstance {
            target,
            state: Mutex::new(descriptor.defaults.clone()),
            cleanup: CleanupStack::new(),
            phase: Mutex::new(LifecyclePhase::Created),
            descriptor: Arc::clone(&descriptor),
        });

        // Reserve the (target, class) slot before running any user hook so
        // a re-entrant assign sees AlreadyAssigned immediately.
        {
            let mut attached = self.attached.lock();
            let per_target = attached.entry(target).or_default();
            if per_target.contains_key(&descriptor.identity) {
                return Err(AttachError::AlreadyAssigned {
                    class: descriptor.identity.clone(),
                    target,
                });
            }
            per_target.insert(descriptor.identity.clone(), Arc::clone(&instance));
        }

        if let Err(err) = self.bring_up(&descriptor, &instance, extra).await {
            self.remove_entry(&instance);
            instance.cleanup.cleanup();
            return Err(err);
        }

        debug!(
            target: "attach",
            "class {:?} assigned to {}", descriptor.identity, target
        );
        Ok(instance)
    }

    async fn bring_up(
        &self,
        descriptor: &Arc<ClassDescriptor>,
        instance: &Arc<ClassInstance>,
        extra: Option<Value>,
    ) -> Result<(), AttachError> {
        run_class_hook(descriptor, Phase::Init, {
            let hooks = Arc::clone(&descriptor.hooks);
            let instance = Arc::clone(instance);
            async move { hooks.on_init(&instance, extra.as_ref()).await }
        })
        .await?;
        *instance.phase.lock() = LifecyclePhase::Initialized;

        run_class_hook(descriptor, Phase::Start, {
            let hooks = Arc::clone(&descriptor.hooks);
            let instance = Arc::clone(instance);
            async move { hooks.on_start(&instance).await }
        })
        .await?;
        *instance.phase.lock() = LifecyclePhase::Started;
        Ok(())
    }

    /// Snapshot of the instances currently attached to a target.
    pub fn attached(&self, target: TargetId) -> HashMap<String, Arc<ClassInstance>> {
        self.attached
            .lock()
            .get(&target)
            .cloned()
            .unwrap_or_default()
    }

    /// Destroy an instance exactly once: drain its cleanup stack, run
    /// `on_destroy`, drop the attachment entry. Calling this on an already
    /// destroyed instance is a no-op.
    pub async fn safe_destroy(&self, instance: &Arc<ClassInstance>) {
        {
            let mut phase = instance.phase.lock();
            if *phase == LifecyclePhase::Destroyed {
                return;
            }
            *phase = LifecyclePhase::Destroyed;
        }

        instance.cleanup.cleanup();
        if let Err(err) = instance
            .descriptor
            .hooks
            .on_destroy(instance)
            .await
        {
            error!(
                target: "attach",
                "destroy hook failed for class {:?} on {}: {:#}",
                instance.descriptor.identity, instance.target, err
            );
        }
        self.remove_entry(instance);
        debug!(
            target: "attach",
            "class {:?} detached from {}",
            instance.descriptor.identity, instance.target
        );
    }

    /// Host notification that a target was destroyed: every instance
    /// attached to it is destroyed and its entry removed.
    pub async fn target_destroyed(&self, target: TargetId) {
        let instances: Vec<Arc<ClassInstance>> =
            self.attached(target).into_values().collect();
        for instance in instances {
            self.safe_destroy(&instance).await;
        }
        self.attached.lock().remove(&target);
    }

    /// Destroy everything, used during process shutdown.
    pub async fn destroy_all(&self) {
        let targets: Vec<TargetId> = self.attached.lock().keys().copied().collect();
        for target in targets {
            self.target_destroyed(target).await;
        }
    }

    fn remove_entry(&self, instance: &Arc<ClassInstance>) {
        let mut attached = self.attached.lock();
        if let Some(per_target) = attached.get_mut(&instance.target) {
            per_target.remove(&instance.descriptor.identity);
            if per_target.is_empty() {
                attached.remove(&instance.target);
            }
        }
    }
}

impl Default for AttachmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_class_hook(
    descriptor: &ClassDescriptor,
    phase: Phase,
    hook: impl std::future::Future<Output = anyhow::Result<()>> + Send,
) -> Result<(), AttachError> {
    let outcome = match descriptor.suspend_policy {
        SuspendPolicy::AllowYield => hook.await,
        SuspendPolicy::BypassYield => {
            let mut hook = Box::pin(hook);
            match poll_immediate(&mut hook).await {
                Some(outcome) => outcome,
                None => {
                    return Err(AttachError::SuspensionViolation {
                        class: descriptor.identity.clone(),
                        phase,
                    })
                }
            }
        }
    };
    outcome.map_err(|source| AttachError::HookFailed {
        class: descriptor.identity.clone(),
        phase,
        source,
    })
}
