use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggerConfig;

/// Log targets the framework itself emits under.
pub const FRAMEWORK_TARGETS: &[&str] = &["lifecycle", "net", "attach", "cleanup"];

/// Initialize logging from the `Logger` config section.
///
/// The `RUST_LOG` environment variable, when present, wins over the
/// configured level. Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggerConfig) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    if config.ignore_framework {
        for target in FRAMEWORK_TARGETS {
            if let Ok(directive) = format!("{target}=off").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
