use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a connected remote peer (a player's client process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

/// Opaque handle for an external engine-owned target an instance attaches to.
///
/// The runtime never dereferences this; the host engine owns the object
/// behind it and notifies the attachment registry when it goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target:{}", self.0)
    }
}

/// Which process side is booting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Server,
    Client,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Side::Server),
            "client" => Ok(Side::Client),
            other => Err(format!("unknown side: {other:?} (expected \"server\" or \"client\")")),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Server => write!(f, "server"),
            Side::Client => write!(f, "client"),
        }
    }
}

/// Where a module is eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Runs on both sides.
    Shared,
    /// Server-only.
    Server,
    /// Client-only.
    Client,
}

impl Scope {
    /// Whether a module with this scope participates in a boot of `side`.
    pub fn runs_on(self, side: Side) -> bool {
        match self {
            Scope::Shared => true,
            Scope::Server => side == Side::Server,
            Scope::Client => side == Side::Client,
        }
    }
}

/// Whether a lifecycle hook is allowed to suspend.
///
/// `BypassYield` hooks must complete synchronously; the orchestrator polls
/// them exactly once and reports a violation if they are still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuspendPolicy {
    #[default]
    AllowYield,
    BypassYield,
}
