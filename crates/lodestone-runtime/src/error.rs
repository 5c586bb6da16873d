use std::fmt;

use thiserror::Error;

use lodestone_core::id::TargetId;

/// Which lifecycle phase an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Start,
    Destroy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Start => write!(f, "start"),
            Phase::Destroy => write!(f, "destroy"),
        }
    }
}

/// Failure surfaced to the bootstrap caller of [`Runtime::start`].
///
/// [`Runtime::start`]: crate::Runtime::start
#[derive(Debug, Error)]
pub enum BootError {
    #[error("runtime already started")]
    AlreadyStarted,

    #[error("init failed for {identity:?}")]
    Init {
        identity: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("start failed for {identity:?}")]
    Start {
        identity: String,
        #[source]
        source: anyhow::Error,
    },

    /// A `BypassYield` descriptor's hook did not complete synchronously.
    #[error("{identity:?} suspended during {phase} despite BypassYield")]
    SuspensionViolation { identity: String, phase: Phase },

    /// Two manifest classes share an identity.
    #[error("class {identity:?} registered twice in the manifest")]
    DuplicateClass { identity: String },
}

/// Component table lookup failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("no component registered as {identity:?}")]
    NotFound { identity: String },
}

/// Errors from the class-attachment registry. Always surfaced synchronously
/// to the caller that triggered them; they indicate a programming error in
/// calling code.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("class {identity:?} is already registered")]
    DuplicateClass { identity: String },

    #[error("no class registered as {identity:?}")]
    UnknownClass { identity: String },

    #[error("class {class:?} is already assigned to {target}")]
    AlreadyAssigned { class: String, target: TargetId },

    #[error("class {class:?} suspended during {phase} despite BypassYield")]
    SuspensionViolation { class: String, phase: Phase },

    #[error("{phase} hook failed for class {class:?}")]
    HookFailed {
        class: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
}
