//! Runtime configuration schema.
//!
//! The runtime consumes a partial-override record supplied by the host;
//! unspecified keys fall back to built-in defaults. Section and key names
//! follow the host-facing convention (`Logger`, `Net`, `Framework`,
//! `Errors`) rather than Rust casing.

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimit;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    #[serde(rename = "Logger")]
    pub logger: LoggerConfig,
    #[serde(rename = "Net")]
    pub net: NetConfig,
    #[serde(rename = "Framework")]
    pub framework: FrameworkConfig,
    #[serde(rename = "Errors")]
    pub errors: ErrorsConfig,
}

impl RuntimeConfig {
    /// Parse a partial TOML override; missing keys keep their defaults.
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Suppress the framework's own log targets, keeping only user logs.
    #[serde(rename = "IgnoreFramework")]
    pub ignore_framework: bool,

    #[serde(rename = "Level")]
    pub level: LogLevel,

    /// Mirror log output into the in-game console. Recorded here for the
    /// host's presentation layer; the runtime itself does not interpret it.
    #[serde(rename = "ShowInGame")]
    pub show_in_game: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            ignore_framework: false,
            level: LogLevel::Info,
            show_in_game: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Rate limit applied to channels opened without an explicit one.
    #[serde(rename = "DefaultRateLimit")]
    pub default_rate_limit: RateLimit,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Debug tooling toggle: `true`, `false`, or `"studio"` to enable it
    /// only inside the editor.
    #[serde(rename = "Debug")]
    pub debug: DebugMode,

    /// When set, phase-1 init hooks that yield are awaited in order instead
    /// of proceeding concurrently up to the phase barrier.
    #[serde(rename = "SerializeInit")]
    pub serialize_init: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "DebugRepr", into = "DebugRepr")]
pub enum DebugMode {
    #[default]
    Disabled,
    Enabled,
    /// Enabled only when running under the editor.
    StudioOnly,
}

impl DebugMode {
    pub fn is_enabled(self, in_studio: bool) -> bool {
        match self {
            DebugMode::Disabled => false,
            DebugMode::Enabled => true,
            DebugMode::StudioOnly => in_studio,
        }
    }
}

/// Wire shape of `Framework.Debug`: a bare bool or the string "studio".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DebugRepr {
    Flag(bool),
    Tag(String),
}

impl TryFrom<DebugRepr> for DebugMode {
    type Error = String;

    fn try_from(repr: DebugRepr) -> Result<Self, Self::Error> {
        match repr {
            DebugRepr::Flag(false) => Ok(DebugMode::Disabled),
            DebugRepr::Flag(true) => Ok(DebugMode::Enabled),
            DebugRepr::Tag(tag) if tag == "studio" => Ok(DebugMode::StudioOnly),
            DebugRepr::Tag(tag) => Err(format!(
                "invalid Framework.Debug value {tag:?} (expected true, false or \"studio\")"
            )),
        }
    }
}

impl From<DebugMode> for DebugRepr {
    fn from(mode: DebugMode) -> Self {
        match mode {
            DebugMode::Disabled => DebugRepr::Flag(false),
            DebugMode::Enabled => DebugRepr::Flag(true),
            DebugMode::StudioOnly => DebugRepr::Tag("studio".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Abort the boot sequence when a descriptor's init hook fails.
    #[serde(rename = "HaltOnInitFailure")]
    pub halt_on_init_failure: bool,

    /// Abort the boot sequence when a descriptor's start hook fails.
    #[serde(rename = "HaltOnStartFailure")]
    pub halt_on_start_failure: bool,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            halt_on_init_failure: true,
            halt_on_start_failure: true,
        }
    }
}
