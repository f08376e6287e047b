//! DF-008: Plain-text rendering of a result tree.
//!
//! Rendering is a pure function of the tree. Depths control how much of
//! each node's detail, children, and error chain are expanded.

use super::error::WrappedError;
use super::result::{NodeStatus, ResultNode};
use std::fmt::Write as _;

/// Verbosity flags as supplied by the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugFlags {
    /// Always show extended detail.
    pub debug: bool,
    /// Extended detail only when the run failed.
    pub debug_error: bool,
    /// Extended detail only when the run succeeded.
    pub debug_success: bool,
    /// Inspection depth for nested detail and error objects.
    pub depth: usize,
}

impl Default for DebugFlags {
    fn default() -> Self {
        Self {
            debug: false,
            debug_error: false,
            debug_success: false,
            depth: 2,
        }
    }
}

/// How deeply to expand a tree when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Levels of nested detail shown; 0 hides detail.
    pub detail_depth: usize,
    /// Levels of children shown below the root; `None` shows all.
    pub child_depth: Option<usize>,
    /// 0: message only. 1: + provenance and hints. 2+: + raw payload and
    /// up to `error_depth - 1` causes.
    pub error_depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            detail_depth: 0,
            child_depth: None,
            error_depth: 1,
        }
    }
}

impl RenderOptions {
    /// Pick render depths for a finished root with the given status.
    pub fn for_status(flags: &DebugFlags, status: NodeStatus) -> Self {
        let extended = flags.debug
            || (flags.debug_error && status.is_failed())
            || (flags.debug_success && matches!(status, NodeStatus::Success | NodeStatus::Warning));
        if extended {
            Self {
                detail_depth: flags.depth.max(1),
                child_depth: None,
                error_depth: flags.depth.max(1) + 1,
            }
        } else {
            Self::default()
        }
    }
}

impl ResultNode {
    /// Render this node and its descendants.
    pub fn render(&self, opts: &RenderOptions) -> String {
        let mut out = String::new();
        render_node(self, opts, 0, &mut out);
        out
    }
}

fn render_node(node: &ResultNode, opts: &RenderOptions, level: usize, out: &mut String) {
    let indent = "  ".repeat(level);
    let duration = node
        .duration_ms()
        .map(|ms| format!(" ({:.2}s)", ms as f64 / 1000.0))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "{}[{}] {} {}{}",
        indent,
        node.status(),
        node.kind(),
        node.name(),
        duration
    );

    if let Some(err) = node.error() {
        render_error(err, opts.error_depth, &format!("{}  ", indent), out);
    }

    if opts.detail_depth > 0 && !node.detail().is_null() {
        let inspected = inspect(node.detail(), opts.detail_depth);
        let _ = writeln!(out, "{}  detail: {}", indent, inspected);
    }

    if node.children().is_empty() {
        return;
    }
    let show_children = opts.child_depth.is_none_or(|max| level < max);
    if show_children {
        for child in node.children() {
            render_node(child, opts, level + 1, out);
        }
    } else {
        let _ = writeln!(
            out,
            "{}  ... {} child result(s) hidden",
            indent,
            node.children().len()
        );
    }
}

fn render_error(err: &WrappedError, depth: usize, indent: &str, out: &mut String) {
    let _ = writeln!(
        out,
        "{}error: [{}] {}: {}",
        indent, err.category, err.name, err.message
    );
    if depth == 0 {
        return;
    }
    for hint in &err.remediation {
        let _ = writeln!(out, "{}  hint: {}", indent, hint);
    }
    for line in &err.provenance {
        let _ = writeln!(out, "{}  at: {}", indent, line);
    }
    if depth < 2 {
        return;
    }
    if let Some(ref raw) = err.raw_payload {
        let _ = writeln!(out, "{}  raw: {}", indent, raw.trim());
    }
    let mut cause = err.cause.as_deref();
    let mut remaining = depth - 1;
    while let (Some(c), true) = (cause, remaining > 0) {
        let _ = writeln!(
            out,
            "{}  caused by: [{}] {}: {}",
            indent, c.category, c.name, c.message
        );
        cause = c.cause.as_deref();
        remaining -= 1;
    }
}

/// Compact JSON with containers below `depth` collapsed.
pub fn inspect(value: &serde_json::Value, depth: usize) -> String {
    collapse(value, depth).to_string()
}

fn collapse(value: &serde_json::Value, depth: usize) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) if depth == 0 => Value::String(format!("[Object: {} keys]", map.len())),
        Value::Array(items) if depth == 0 => Value::String(format!("[Array: {} items]", items.len())),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), collapse(v, depth - 1)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| collapse(v, depth - 1)).collect()),
        other => other.clone(),
    }
}
