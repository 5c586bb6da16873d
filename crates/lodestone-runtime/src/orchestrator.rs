//! The lifecycle orchestrator.
//!
//! Boot runs two ordered passes over the manifest: every eligible
//! descriptor's `on_init`, a barrier, then every module's `on_start`.
//! Invocation order is priority ascending with registration order breaking
//! ties; the manifest supplies registration order, so identical manifests
//! boot identically. Shutdown destroys in exact reverse order, best-effort.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::poll_immediate;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use lodestone_core::config::RuntimeConfig;
use lodestone_core::id::{PeerId, Side, SuspendPolicy};
use lodestone_net::Wire;

use crate::attach::ClassDescriptor;
use crate::builder::RuntimeBuilder;
use crate::context::{RuntimeContext, UtilityValue};
use crate::error::{BootError, Phase};
use crate::module::{Component, Module};

/// Unified view of modules and components during ordering and dispatch.
#[derive(Clone)]
pub(crate) enum Descriptor {
    Module(Arc<dyn Module>),
    Component(Arc<dyn Component>),
}

impl Descriptor {
    fn identity(&self) -> &str {
        match self {
            Descriptor::Module(m) => m.identity(),
            Descriptor::Component(c) => c.identity(),
        }
    }

    fn priority(&self) -> i32 {
        match self {
            Descriptor::Module(m) => m.priority(),
            Descriptor::Component(c) => c.priority(),
        }
    }

    fn runs_on(&self, side: Side) -> bool {
        match self {
            Descriptor::Module(m) => m.scope().runs_on(side),
            Descriptor::Component(c) => c.scope().runs_on(side),
        }
    }

    fn suspend_policy(&self) -> SuspendPolicy {
        match self {
            Descriptor::Module(m) => m.suspend_policy(),
            Descriptor::Component(c) => c.suspend_policy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BootState {
    Idle,
    Started,
    Failed,
    ShutDown,
}

/// What a completed boot leaves behind for shutdown.
struct BootRecord {
    ctx: Arc<RuntimeContext>,
    /// Sorted roster with a flag for "reached the state that earns an
    /// on_destroy": started modules and initialized components.
    roster: Vec<(Descriptor, bool)>,
}

type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub struct Runtime {
    config: RuntimeConfig,
    wire: Wire,
    client_peer: PeerId,
    descriptors: Vec<Descriptor>,
    classes: Mutex<Vec<ClassDescriptor>>,
    utilities: Mutex<Vec<(String, UtilityValue)>>,
    state: Mutex<BootState>,
    record: Mutex<Option<BootRecord>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn new(
        config: RuntimeConfig,
        wire: Option<Wire>,
        client_peer: PeerId,
        descriptors: Vec<Descriptor>,
        classes: Vec<ClassDescriptor>,
        utilities: Vec<(String, UtilityValue)>,
    ) -> Self {
        let wire =
            wire.unwrap_or_else(|| Wire::new(config.net.default_rate_limit));
        Self {
            config,
            wire,
            client_peer,
            descriptors,
            classes: Mutex::new(classes),
            utilities: Mutex::new(utilities),
            state: Mutex::new(BootState::Idle),
            record: Mutex::new(None),
        }
    }

    /// Boot one process side. Not re-entrant: a second call fails with
    /// [`BootError::AlreadyStarted`], including after a failed boot.
    pub async fn start(&self, side: Side) -> Result<Arc<RuntimeContext>, BootError> {
        {
            let mut state = self.state.lock();
            if *state != BootState::Idle {
                return Err(BootError::AlreadyStarted);
            }
            // Claimed for this boot; a failure below leaves it consumed.
            *state = BootState::Failed;
        }

        let local_peer = match side {
            Side::Server => None,
            Side::Client => Some(self.wire.connect(self.client_peer)),
        };
        let ctx = Arc::new(RuntimeContext::new(
            side,
            self.config.clone(),
            self.wire.clone(),
            local_peer,
        ));

        // Manifest classes and utilities land before any hook runs.
        for class in self.classes.lock().drain(..) {
            let identity = class.identity().to_string();
            if ctx.attachments().register(class).is_err() {
                return Err(BootError::DuplicateClass { identity });
            }
        }
        for (name, value) in self.utilities.lock().drain(..) {
            ctx.expose_utility(name, value);
        }

        let mut roster: Vec<Descriptor> = self
            .descriptors
            .iter()
            .filter(|d| d.runs_on(side))
            .cloned()
            .collect();
        // Stable sort: equal priorities keep registration order.
        roster.sort_by_key(Descriptor::priority);

        info!(
            target: "lifecycle",
            "booting {} with {} descriptor(s)", side, roster.len()
        );

        let serialize = self.config.framework.serialize_init;
        let halt_init = self.config.errors.halt_on_init_failure;
        let halt_start = self.config.errors.halt_on_start_failure;

        let all = vec![true; roster.len()];
        let init_ok =
            run_phase(&ctx, &roster, &all, Phase::Init, serialize, halt_init).await?;
        // A descriptor whose init failed under a lenient policy is skipped
        // in phase 2 rather than started half-initialized.
        let start_ok =
            run_phase(&ctx, &roster, &init_ok, Phase::Start, serialize, halt_start).await?;

        let record = BootRecord {
            ctx: Arc::clone(&ctx),
            roster: roster
                .into_iter()
                .enumerate()
                .map(|(i, desc)| {
                    let survived = match desc {
                        Descriptor::Module(_) => init_ok[i] && start_ok[i],
                        Descriptor::Component(_) => init_ok[i],
                    };
                    (desc, survived)
                })
                .collect(),
        };
        *self.record.lock() = Some(record);
        *self.state.lock() = BootState::Started;
        info!(target: "lifecycle", "{} side started", side);
        Ok(ctx)
    }

    /// Tear the side down: `on_destroy` in strictly reverse boot order for
    /// every descriptor that came up, then attachments, then the wire.
    /// Best-effort throughout; a destroy failure is logged and the
    /// remaining destroys still run.
    pub async fn shutdown(&self) {
        let record = {
            let mut state = self.state.lock();
            if *state != BootState::Started {
                return;
            }
            *state = BootState::ShutDown;
            self.record.lock().take()
        };
        let Some(record) = record else { return };
        let ctx = record.ctx;

        for (descriptor, survived) in record.roster.iter().rev() {
            if !survived {
                continue;
            }
            let identity = descriptor.identity();
            debug!(target: "lifecycle", "destroying {:?}", identity);
            let outcome = match descriptor {
                Descriptor::Module(m) => m.on_destroy(Arc::clone(&ctx)).await,
                Descriptor::Component(c) => c.on_destroy(Arc::clone(&ctx)).await,
            };
            if let Err(err) = outcome {
                error!(
                    target: "lifecycle",
                    "destroy failed for {:?}: {:#}", identity, err
                );
            }
        }

        ctx.attachments().destroy_all().await;
        ctx.wire().shutdown();
        info!(target: "lifecycle", "{} side shut down", ctx.side());
    }
}

/// Build the hook future for one descriptor in one phase. Components have
/// no start hook; their init records them into the component table on
/// success.
fn hook_future(descriptor: &Descriptor, ctx: &Arc<RuntimeContext>, phase: Phase) -> Option<HookFuture> {
    let ctx = Arc::clone(ctx);
    match (descriptor, phase) {
        (Descriptor::Module(m), Phase::Init) => {
            let m = Arc::clone(m);
            Some(Box::pin(async move { m.on_init(ctx).await }))
        }
        (Descriptor::Module(m), Phase::Start) => {
            let m = Arc::clone(m);
            Some(Box::pin(async move { m.on_start(ctx).await }))
        }
        (Descriptor::Component(c), Phase::Init) => {
            let c = Arc::clone(c);
            Some(Box::pin(async move {
                c.on_init(Arc::clone(&ctx)).await?;
                ctx.record_component(c);
                Ok(())
            }))
        }
        (Descriptor::Component(_), Phase::Start) => None,
        (_, Phase::Destroy) => None,
    }
}

/// Run one boot phase over the sorted roster.
///
/// Hooks are invoked strictly in roster order. A hook that completes
/// synchronously is resolved on the spot; an AllowYield hook that suspends
/// is either awaited inline (`serialize`) or spawned and joined at the
/// phase barrier, so the next phase never begins before this one fully
/// completes. Returns per-descriptor success flags aligned with the roster.
async fn run_phase(
    ctx: &Arc<RuntimeContext>,
    roster: &[Descriptor],
    eligible: &[bool],
    phase: Phase,
    serialize: bool,
    halt: bool,
) -> Result<Vec<bool>, BootError> {
    let mut ok = eligible.to_vec();
    let mut spawned: VecDeque<(usize, JoinHandle<anyhow::Result<()>>)> = VecDeque::new();

    for (index, descriptor) in roster.iter().enumerate() {
        if !eligible[index] {
            continue;
        }
        let Some(fut) = hook_future(descriptor, ctx, phase) else {
            continue;
        };
        let identity = descriptor.identity();
        debug!(target: "lifecycle", "{} {:?}", phase, identity);

        match descriptor.suspend_policy() {
            SuspendPolicy::BypassYield => {
                let mut fut = fut;
                match poll_immediate(&mut fut).await {
                    Some(outcome) => {
                        if let Some(err) =
                            note_outcome(identity, phase, outcome, halt, &mut ok[index])
                        {
                            abort_spawned(spawned);
                            return Err(err);
                        }
                    }
                    None => {
                        let err = BootError::SuspensionViolation {
                            identity: identity.to_string(),
                            phase,
                        };
                        if halt {
                            abort_spawned(spawned);
                            return Err(err);
                        }
                        error!(target: "lifecycle", "{}", err);
                        ok[index] = false;
                    }
                }
            }
            SuspendPolicy::AllowYield if serialize => {
                let outcome = fut.await;
                if let Some(err) = note_outcome(identity, phase, outcome, halt, &mut ok[index]) {
                    abort_spawned(spawned);
                    return Err(err);
                }
            }
            SuspendPolicy::AllowYield => {
                let mut fut = fut;
                match poll_immediate(&mut fut).await {
                    Some(outcome) => {
                        if let Some(err) =
                            note_outcome(identity, phase, outcome, halt, &mut ok[index])
                        {
                            abort_spawned(spawned);
                            return Err(err);
                        }
                    }
                    None => {
                        spawned.push_back((index, tokio::spawn(fut)));
                    }
                }
            }
        }
    }

    // Phase barrier: every in-flight hook joins before the phase ends.
    while let Some((index, handle)) = spawned.pop_front() {
        let identity = roster[index].identity();
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(anyhow::anyhow!("hook task panicked: {join_err}")),
        };
        if let Some(err) = note_outcome(identity, phase, outcome, halt, &mut ok[index]) {
            abort_spawned(spawned);
            return Err(err);
        }
    }

    Ok(ok)
}

/// Apply the halt policy to one hook outcome. Returns the boot error to
/// abort with, or `None` to continue.
fn note_outcome(
    identity: &str,
    phase: Phase,
    outcome: anyhow::Result<()>,
    halt: bool,
    ok: &mut bool,
) -> Option<BootError> {
    let source = match outcome {
        Ok(()) => return None,
        Err(source) => source,
    };
    *ok = false;
    if halt {
        let identity = identity.to_string();
        return Some(match phase {
            Phase::Start => BootError::Start { identity, source },
            _ => BootError::Init { identity, source },
        });
    }
    warn!(
        target: "lifecycle",
        "{} failed for {:?}, continuing: {:#}", phase, identity, source
    );
    None
}

fn abort_spawned(spawned: VecDeque<(usize, JoinHandle<anyhow::Result<()>>)>) {
    for (_, handle) in spawned {
        handle.abort();
    }
}
