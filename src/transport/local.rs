//! DF-011: Local process transport for the platform CLI.
//!
//! Runs `<binary> <command> <args...>` with stdin closed and both output
//! streams captured. A run that exceeds the configured timeout is killed
//! and reported as a transport error.

use super::{ExternalTool, ToolInvocation, ToolOutput};
use crate::core::error::WrappedError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Platform CLI reached through a local binary.
#[derive(Debug, Clone)]
pub struct ProcessTool {
    binary: String,
    timeout: Duration,
}

impl ProcessTool {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ExternalTool for ProcessTool {
    fn binary(&self) -> &str {
        &self.binary
    }

    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, WrappedError> {
        let child = Command::new(&self.binary)
            .arg(&invocation.command)
            .args(&invocation.args)
            .env("SFDX_JSON_TO_STDOUT", "true")
            .env("FORCE_COLOR", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WrappedError::transport(
                    "SpawnFailed",
                    format!("failed to spawn {}: {}", self.binary, e),
                )
            })?;

        tracing::debug!(binary = %self.binary, command = %invocation.command, "tool_spawned");

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                WrappedError::transport("WaitFailed", format!("wait error: {}", e))
            })?,
            Err(_) => {
                return Err(WrappedError::transport(
                    "ToolTimeout",
                    format!(
                        "{} {} did not finish within {}s",
                        self.binary,
                        invocation.command,
                        self.timeout.as_secs()
                    ),
                ))
            }
        };

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
