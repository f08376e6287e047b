//! DF-009: Log level and per-execution debug context.
//!
//! Debug namespaces are enabled per execution through a [`DebugContext`]
//! value carried in the step context. Nothing here is process-global except
//! the tracing subscriber installed once by `main`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log level shared by the engine and the platform CLI's `--loglevel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Directive for a tracing `EnvFilter`.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Fatal => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!(
                "unknown log level '{}' (expected trace, debug, info, warn, error, fatal)",
                other
            )),
        }
    }
}

/// Debug namespaces enabled for one execution.
///
/// A namespace pattern is either exact (`compiler`), a prefix wildcard
/// (`action:*`), or `*` for everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugContext {
    namespaces: Vec<String>,
    log_level: LogLevel,
}

impl DebugContext {
    pub fn new(namespaces: Vec<String>, log_level: LogLevel) -> Self {
        Self {
            namespaces,
            log_level,
        }
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn is_enabled(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|pattern| {
            if pattern == "*" {
                return true;
            }
            match pattern.strip_suffix('*') {
                Some(prefix) => namespace.starts_with(prefix),
                None => pattern == namespace,
            }
        })
    }

    /// Emit a debug event if `namespace` is enabled.
    pub fn debug(&self, namespace: &str, message: &str) {
        if self.is_enabled(namespace) {
            tracing::debug!(target: "demoforge::debug", namespace, "{}", message);
        }
    }

    /// Emit a debug event carrying a structured payload.
    pub fn debug_value(&self, namespace: &str, message: &str, value: &serde_json::Value) {
        if self.is_enabled(namespace) {
            tracing::debug!(target: "demoforge::debug", namespace, payload = %value, "{}", message);
        }
    }
}

/// Filter directive for `level`, opening the debug target when namespaces
/// are enabled.
pub fn filter_directive(level: LogLevel, namespaces_enabled: bool) -> String {
    if namespaces_enabled {
        format!("{},demoforge::debug=debug", level.filter_directive())
    } else {
        level.filter_directive().to_string()
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: LogLevel, namespaces_enabled: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            tracing_subscriber::EnvFilter::try_new(filter_directive(level, namespaces_enabled))
        })
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
