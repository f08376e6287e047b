//! DF-012: Engine configuration.
//!
//! Lookup: explicit `--config` path, then `./demoforge.yaml`, then
//! defaults. `DEMOFORGE_TOOL` and `DEMOFORGE_DEVHUB` override the file;
//! CLI flags override both (applied by the caller).

use crate::core::debug::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "demoforge.yaml";
pub const ENV_TOOL: &str = "DEMOFORGE_TOOL";
pub const ENV_DEVHUB: &str = "DEMOFORGE_DEVHUB";

fn default_tool_binary() -> String {
    "sfdx".to_string()
}

fn default_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Platform CLI binary
    #[serde(default = "default_tool_binary")]
    pub tool_binary: String,

    /// Per-invocation timeout
    #[serde(default = "default_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default)]
    pub default_devhub_alias: Option<String>,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Debug namespaces enabled for every run
    #[serde(default)]
    pub debug_namespaces: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_binary: default_tool_binary(),
            command_timeout_secs: default_timeout(),
            default_devhub_alias: None,
            log_level: LogLevel::default(),
            debug_namespaces: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Apply `DEMOFORGE_*` overrides from `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tool) = lookup(ENV_TOOL).filter(|v| !v.is_empty()) {
            self.tool_binary = tool;
        }
        if let Some(hub) = lookup(ENV_DEVHUB).filter(|v| !v.is_empty()) {
            self.default_devhub_alias = Some(hub);
        }
        self
    }
}

/// Parse a config document.
pub fn parse_config(yaml: &str) -> Result<EngineConfig, String> {
    if yaml.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("config YAML parse error: {}", e))
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<EngineConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Resolve the effective config. An explicit path must exist; the
/// default file in `cwd` is optional.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<EngineConfig, String> {
    let config = match explicit {
        Some(path) => parse_config_file(path)?,
        None => {
            let default_path = cwd.join(DEFAULT_CONFIG_FILE);
            if default_path.is_file() {
                parse_config_file(&default_path)?
            } else {
                EngineConfig::default()
            }
        }
    };
    let config = config.apply_env(|key| std::env::var(key).ok());
    tracing::debug!(tool = %config.tool_binary, timeout_secs = config.command_timeout_secs, "config_loaded");
    Ok(config)
}
