//! DF-010: Transport abstraction for invoking the platform CLI.
//!
//! Actions never spawn processes themselves; they build a
//! [`ToolInvocation`] and hand it to an [`ExternalTool`]. The process-backed
//! implementation lives in [`local`].

pub mod local;

use crate::core::error::{wrap_tool_payload, WrappedError};
use async_trait::async_trait;
use serde::Serialize;

/// One command line for the platform CLI (binary excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInvocation {
    pub command: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `flag value`.
    pub fn flag(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Append `flag value` only when a value is present.
    pub fn flag_opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.flag(flag, v),
            None => self,
        }
    }

    /// Human-readable form, used as the process node name.
    pub fn display(&self, binary: &str) -> String {
        let mut parts = vec![binary.to_string(), self.command.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Output captured from one tool run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The mutation backend. `Err` means the process could not be run at all.
#[async_trait]
pub trait ExternalTool: Send + Sync {
    /// Binary name, for display.
    fn binary(&self) -> &str;

    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, WrappedError>;
}

/// Interpret `--json` output: `Ok(result)` on `status: 0`, else a wrapped
/// tool error. Unparseable stdout is kept alongside stderr in the payload.
pub fn interpret_output(out: &ToolOutput) -> Result<serde_json::Value, WrappedError> {
    let stdout = out.stdout.trim();
    let parsed = serde_json::from_str::<serde_json::Value>(stdout).ok();

    if let Some(ref value) = parsed {
        let status = value.get("status").and_then(|s| s.as_i64());
        let ok = match status {
            Some(code) => code == 0 && out.success(),
            None => out.success(),
        };
        if ok {
            return Ok(value
                .get("result")
                .cloned()
                .unwrap_or_else(|| value.clone()));
        }
    }

    let stderr = out.stderr.trim();
    let payload = if parsed.is_some() || stderr.is_empty() {
        out.stdout.clone()
    } else if stdout.is_empty() {
        out.stderr.clone()
    } else {
        format!("{}\n--- stderr ---\n{}", stdout, stderr)
    };
    let mut err = wrap_tool_payload(&payload);
    if err.status_code.is_none() {
        err.status_code = Some(i64::from(out.exit_code));
    }
    Err(err)
}
