/// Shared foundation types for the lodestone runtime
///
/// This crate provides the pieces the rest of the workspace builds on:
/// peer/target identities, execution sides and scopes, the runtime config
/// schema, the LIFO cleanup primitive and the per-sender token bucket.
/// Crates above this one implement messaging and lifecycle orchestration
/// without circular dependencies.
pub mod cleanup;
pub mod config;
pub mod id;
pub mod logging;
pub mod rate_limit;

pub use cleanup::{CleanupStack, Dispose};
pub use config::{
    DebugMode, ErrorsConfig, FrameworkConfig, LogLevel, LoggerConfig, NetConfig, RuntimeConfig,
};
pub use id::{PeerId, Scope, Side, SuspendPolicy, TargetId};
pub use logging::init_logging;
pub use rate_limit::{BucketTable, RateLimit};
