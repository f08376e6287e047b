//! DF-002: Error wrapper, one structured error shape for every layer.
//!
//! Anything raised inside the engine (native errors, JSON error payloads
//! from the platform CLI, unparseable shell output) is normalized into a
//! [`WrappedError`]. Each layer that re-raises prepends one provenance line,
//! so the trail reads top-down: Command → Recipe → Engine → Action → tool.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Dispatch category. Replaces error subclassing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Bad recipe or compile-option input. Never retried.
    Validation,
    /// The tool returned a structured failure payload.
    ExternalTool,
    /// The tool's output could not be parsed.
    Parse,
    /// The tool process could not be started or talked to.
    Transport,
    /// Logic error inside the engine.
    Internal,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::ExternalTool => write!(f, "EXTERNAL_TOOL"),
            Self::Parse => write!(f, "PARSE"),
            Self::Transport => write!(f, "TRANSPORT"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Structured error with a provenance trail and an optional cause chain.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{name}: {message}")]
pub struct WrappedError {
    pub category: ErrorCategory,
    pub name: String,
    pub message: String,

    /// Top-down call chain, one line per re-raising layer.
    #[serde(default)]
    pub provenance: Vec<String>,

    /// Raw text that could not be parsed, kept for diagnosis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,

    /// Remediation hints reported by the tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    #[source]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<WrappedError>>,
}

impl WrappedError {
    pub fn new(category: ErrorCategory, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            message: message.into(),
            provenance: Vec::new(),
            raw_payload: None,
            status_code: None,
            remediation: Vec::new(),
            warnings: Vec::new(),
            cause: None,
        }
    }

    pub fn validation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, name, message)
    }

    pub fn internal(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, name, message)
    }

    pub fn transport(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transport, name, message)
    }

    /// Attach the error this one wraps.
    pub fn with_cause(mut self, cause: WrappedError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Builder form of [`WrappedError::add_provenance`].
    pub fn with_provenance(mut self, line: impl Into<String>) -> Self {
        self.add_provenance(line);
        self
    }

    /// Prepend a line to the trail. Layers are walked bottom-up while
    /// unwinding, so prepending yields a top-down trail.
    pub fn add_provenance(&mut self, line: impl Into<String>) {
        self.provenance.insert(0, line.into());
    }

    /// Deepest error in the `cause` chain (self when there is none).
    pub fn root_cause(&self) -> &WrappedError {
        let mut current = self;
        while let Some(ref next) = current.cause {
            current = next;
        }
        current
    }

    /// Whether the engine should classify this as an unexpected error
    /// (ERROR status) rather than an expected failure (FAILURE status).
    pub fn is_unexpected(&self) -> bool {
        matches!(self.category, ErrorCategory::Internal | ErrorCategory::Unknown)
    }
}

impl From<std::io::Error> for WrappedError {
    fn from(e: std::io::Error) -> Self {
        wrap(Thrown::from(e))
    }
}

impl From<serde_json::Error> for WrappedError {
    fn from(e: serde_json::Error) -> Self {
        wrap(Thrown::from(e))
    }
}

// ============================================================================
// wrap()
// ============================================================================

/// Anything that can be raised and handed to [`wrap`].
#[derive(Debug)]
pub enum Thrown {
    /// Already structured; passes through unchanged.
    Wrapped(WrappedError),
    /// A native error value: only its type name and message survive.
    Native { name: String, message: String },
    /// Raw text presumed to be an external tool's error payload.
    Text(String),
}

impl From<WrappedError> for Thrown {
    fn from(e: WrappedError) -> Self {
        Self::Wrapped(e)
    }
}

impl From<std::io::Error> for Thrown {
    fn from(e: std::io::Error) -> Self {
        Self::Native {
            name: format!("IoError({:?})", e.kind()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Thrown {
    fn from(e: serde_json::Error) -> Self {
        Self::Native {
            name: "JsonError".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<&str> for Thrown {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Thrown {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Normalize a raised value into a [`WrappedError`].
pub fn wrap(thrown: impl Into<Thrown>) -> WrappedError {
    match thrown.into() {
        Thrown::Wrapped(e) => e,
        Thrown::Native { name, message } => {
            let line = format!("{}: {}", name, message);
            WrappedError::internal(name, message).with_provenance(line)
        }
        Thrown::Text(text) => wrap_tool_payload(&text),
    }
}

/// Wrap raw tool output. Structured JSON first; raw-text-preserving second.
pub fn wrap_tool_payload(raw: &str) -> WrappedError {
    let trimmed = raw.trim();
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) if value.is_object() => {
            if let Ok(already) = serde_json::from_value::<WrappedError>(value.clone()) {
                return already;
            }
            from_tool_json(&value, trimmed)
        }
        _ => WrappedError {
            raw_payload: Some(raw.to_string()),
            ..WrappedError::new(
                ErrorCategory::Parse,
                "UnparseableToolOutput",
                "the external tool returned output that could not be parsed; \
                 inspect the raw payload for details",
            )
        },
    }
}

/// Map the well-known fields of a tool error payload.
fn from_tool_json(value: &serde_json::Value, raw: &str) -> WrappedError {
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("ExternalToolError");
    let message = value
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("the external tool reported an error without a message");

    let mut err = WrappedError::new(ErrorCategory::ExternalTool, name, message);
    err.status_code = value
        .get("status")
        .or_else(|| value.get("exitCode"))
        .and_then(|v| v.as_i64());
    err.remediation = string_list(value.get("actions"));
    err.warnings = string_list(value.get("warnings"));
    if value.get("message").is_none() {
        err.raw_payload = Some(raw.to_string());
    }
    err.add_provenance(format!("external tool: {}", message));
    err
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
