//! Module and component descriptor traits.
//!
//! Lifecycle hooks are optional-method slots: the default implementations
//! are no-ops, so a descriptor declares only the hooks it needs. Hooks are
//! async; descriptors that declare [`SuspendPolicy::BypassYield`] must
//! complete each hook without suspending, which the orchestrator checks by
//! polling the hook exactly once.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use lodestone_core::id::{Scope, SuspendPolicy};

use crate::context::RuntimeContext;

/// A user-authored module run through the two-phase boot lifecycle.
///
/// `priority` orders modules within a boot pass (lower runs first, default
/// 100, ties keep registration order); `scope` selects which sides the
/// module participates in.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Unique within the module's execution side.
    fn identity(&self) -> &str;

    fn priority(&self) -> i32 {
        100
    }

    fn scope(&self) -> Scope {
        Scope::Shared
    }

    fn suspend_policy(&self) -> SuspendPolicy {
        SuspendPolicy::AllowYield
    }

    async fn on_init(&self, _ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_start(&self, _ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_destroy(&self, _ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A process-wide singleton descriptor: init-only, retrievable by identity
/// from the component table once its init has completed.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    fn identity(&self) -> &str;

    fn priority(&self) -> i32 {
        100
    }

    fn scope(&self) -> Scope {
        Scope::Shared
    }

    fn suspend_policy(&self) -> SuspendPolicy {
        SuspendPolicy::AllowYield
    }

    async fn on_init(&self, _ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_destroy(&self, _ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Downcast support for typed retrieval from the component table.
    fn as_any(&self) -> &dyn Any;
}
