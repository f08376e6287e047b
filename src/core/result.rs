//! DF-001: Result tree, the hierarchical outcome of every unit of work.
//!
//! A [`ResultNode`] is created by each layer (command, recipe, engine,
//! action, external process). Status moves `INITIALIZED → EXECUTING →
//! terminal` and never leaves a terminal state. Children are moved into
//! their parent, so a node has at most one parent.
//!
//! Bubbling: [`ResultNode::add_child`] returns `Err` when a failed child
//! trips the parent's bubble policy. The parent has already moved itself to
//! the matching terminal status; the caller decides whether to propagate
//! with `?`.

use super::error::WrappedError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Layer that created a node. Used for rendering, not control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Command,
    Recipe,
    Engine,
    Action,
    ExternalProcess,
    Unknown,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "Command"),
            Self::Recipe => write!(f, "Recipe"),
            Self::Engine => write!(f, "Engine"),
            Self::Action => write!(f, "Action"),
            Self::ExternalProcess => write!(f, "Process"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Node lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Initialized,
    Executing,
    Success,
    Failure,
    Error,
    Warning,
    Unknown,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::Error | Self::Warning
        )
    }

    /// FAILURE or ERROR.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failure | Self::Error)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "INITIALIZED"),
            Self::Executing => write!(f, "EXECUTING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Outcome record for one unit of work.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultNode {
    name: String,
    kind: NodeKind,
    status: NodeStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    detail: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<ResultNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<WrappedError>,
    #[serde(skip)]
    bubble_error: bool,
    #[serde(skip)]
    bubble_failure: bool,
}

impl ResultNode {
    /// Create an INITIALIZED node with bubbling disabled.
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            status: NodeStatus::Initialized,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            detail: serde_json::Value::Null,
            children: Vec::new(),
            error: None,
            bubble_error: false,
            bubble_failure: false,
        }
    }

    /// Create a node that is already EXECUTING.
    pub fn start(name: impl Into<String>, kind: NodeKind) -> Self {
        let mut node = Self::new(name, kind);
        node.status = NodeStatus::Executing;
        node.started_at = Some(Utc::now());
        node
    }

    pub fn with_bubbling(mut self, bubble_error: bool, bubble_failure: bool) -> Self {
        self.bubble_error = bubble_error;
        self.bubble_failure = bubble_failure;
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    /// INITIALIZED → EXECUTING.
    pub fn begin(&mut self) -> Result<(), WrappedError> {
        if self.status != NodeStatus::Initialized {
            return Err(self.mutation_error("begin"));
        }
        self.status = NodeStatus::Executing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Replace the detail payload of a non-terminal node.
    pub fn set_detail(&mut self, detail: serde_json::Value) -> Result<(), WrappedError> {
        self.guard("set_detail")?;
        self.detail = detail;
        Ok(())
    }

    pub fn succeed(&mut self, detail: Option<serde_json::Value>) -> Result<(), WrappedError> {
        self.finish(NodeStatus::Success, detail, None, "succeed")
    }

    pub fn warn(&mut self, detail: Option<serde_json::Value>) -> Result<(), WrappedError> {
        self.finish(NodeStatus::Warning, detail, None, "warn")
    }

    /// Expected failure (e.g. a validation rule rejected input).
    pub fn fail(&mut self, error: WrappedError) -> Result<(), WrappedError> {
        self.finish(NodeStatus::Failure, None, Some(error), "fail")
    }

    /// Unexpected or internal error.
    pub fn raise(&mut self, error: WrappedError) -> Result<(), WrappedError> {
        self.finish(NodeStatus::Error, None, Some(error), "raise")
    }

    /// Attach a child. Returns `Err` when the child's FAILURE/ERROR status
    /// bubbles through this node; this node is then terminal.
    pub fn add_child(&mut self, child: ResultNode) -> Result<(), WrappedError> {
        self.guard("add_child")?;
        let bubble = match child.status {
            NodeStatus::Failure if self.bubble_failure => Some(NodeStatus::Failure),
            NodeStatus::Error if self.bubble_error => Some(NodeStatus::Error),
            _ => None,
        };
        let child_error = child.error.clone();
        let child_name = child.name.clone();
        self.children.push(child);

        let Some(status) = bubble else {
            return Ok(());
        };

        let mut error = child_error.unwrap_or_else(|| {
            WrappedError::internal(
                "MissingChildError",
                format!("child '{}' reached {} without an error", child_name, status),
            )
        });
        error.add_provenance(self.provenance_line(&error.message));
        self.finish(status, None, Some(error.clone()), "bubble")?;
        Err(error)
    }

    /// One provenance line naming this node.
    pub fn provenance_line(&self, message: &str) -> String {
        format!("{} {}: {}", self.kind, self.name, message)
    }

    fn finish(
        &mut self,
        status: NodeStatus,
        detail: Option<serde_json::Value>,
        error: Option<WrappedError>,
        op: &str,
    ) -> Result<(), WrappedError> {
        self.guard(op)?;
        let now = Utc::now();
        let started = *self.started_at.get_or_insert(now);
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - started).num_milliseconds().max(0));
        if let Some(d) = detail {
            self.detail = d;
        }
        self.error = error;
        Ok(())
    }

    fn guard(&self, op: &str) -> Result<(), WrappedError> {
        if self.status.is_terminal() {
            return Err(self.mutation_error(op));
        }
        Ok(())
    }

    fn mutation_error(&self, op: &str) -> WrappedError {
        WrappedError::internal(
            "TerminalNodeMutation",
            format!(
                "cannot {} on {} '{}': node is already {}",
                op, self.kind, self.name, self.status
            ),
        )
    }

    // -- accessors --

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    pub fn detail(&self) -> &serde_json::Value {
        &self.detail
    }

    pub fn children(&self) -> &[ResultNode] {
        &self.children
    }

    pub fn error(&self) -> Option<&WrappedError> {
        self.error.as_ref()
    }

    pub fn bubble_error(&self) -> bool {
        self.bubble_error
    }

    pub fn bubble_failure(&self) -> bool {
        self.bubble_failure
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn children_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &ResultNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// Process exit code for this node's status.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            NodeStatus::Success | NodeStatus::Warning => 0,
            NodeStatus::Failure | NodeStatus::Error => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCategory;
    use proptest::prelude::*;

    fn failed_child(name: &str) -> ResultNode {
        let mut child = ResultNode::start(name, NodeKind::Action);
        child
            .fail(WrappedError::new(ErrorCategory::ExternalTool, "ToolFailed", "exit 1"))
            .unwrap();
        child
    }

    #[test]
    fn test_df001_new_is_initialized() {
        let node = ResultNode::new("cmd", NodeKind::Command);
        assert_eq!(node.status(), NodeStatus::Initialized);
        assert!(node.started_at().is_none());
        assert!(node.completed_at().is_none());
    }

    #[test]
    fn test_df001_start_is_executing() {
        let node = ResultNode::start("cmd", NodeKind::Command);
        assert_eq!(node.status(), NodeStatus::Executing);
        assert!(node.started_at().is_some());
        assert!(node.completed_at().is_none());
    }

    #[test]
    fn test_df001_begin_transitions_once() {
        let mut node = ResultNode::new("x", NodeKind::Engine);
        node.begin().unwrap();
        assert_eq!(node.status(), NodeStatus::Executing);
        assert!(node.begin().is_err());
    }

    #[test]
    fn test_df001_succeed_sets_timing() {
        let mut node = ResultNode::start("x", NodeKind::Action);
        node.succeed(Some(serde_json::json!({"ok": true}))).unwrap();
        assert_eq!(node.status(), NodeStatus::Success);
        assert!(node.completed_at().is_some());
        assert!(node.duration_ms().unwrap() >= 0);
        assert_eq!(node.detail()["ok"], true);
        assert!(node.error().is_none());
    }

    #[test]
    fn test_df001_finish_without_begin_fills_start() {
        let mut node = ResultNode::new("x", NodeKind::Action);
        node.warn(None).unwrap();
        assert_eq!(node.status(), NodeStatus::Warning);
        assert!(node.started_at().is_some());
        assert_eq!(node.duration_ms(), Some(0));
    }

    #[test]
    fn test_df001_terminal_is_immutable() {
        let mut node = ResultNode::start("x", NodeKind::Action);
        node.succeed(None).unwrap();
        let err = node
            .fail(WrappedError::validation("Late", "too late"))
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Internal);
        assert_eq!(err.name, "TerminalNodeMutation");
        assert_eq!(node.status(), NodeStatus::Success);
        assert!(node.error().is_none());
        assert!(node.add_child(ResultNode::new("c", NodeKind::Action)).is_err());
        assert!(node.children().is_empty());
        assert!(node.set_detail(serde_json::json!(1)).is_err());
    }

    #[test]
    fn test_df001_bubble_failure_raises() {
        let mut parent = ResultNode::start("create-org", NodeKind::Action).with_bubbling(true, true);
        let err = parent.add_child(failed_child("sfdx force:org:create")).unwrap_err();
        assert_eq!(parent.status(), NodeStatus::Failure);
        assert_eq!(parent.children().len(), 1);
        assert_eq!(err.category, ErrorCategory::ExternalTool);
        assert_eq!(err.provenance[0], "Action create-org: exit 1");
        assert_eq!(parent.error(), Some(&err));
    }

    #[test]
    fn test_df001_bubble_error_raises_error_status() {
        let mut child = ResultNode::start("proc", NodeKind::ExternalProcess);
        child.raise(WrappedError::internal("Boom", "boom")).unwrap();
        let mut parent = ResultNode::start("act", NodeKind::Action).with_bubbling(true, false);
        assert!(parent.add_child(child).is_err());
        assert_eq!(parent.status(), NodeStatus::Error);
    }

    #[test]
    fn test_df001_no_bubble_records_child() {
        let mut parent = ResultNode::start("engine", NodeKind::Engine);
        parent.add_child(failed_child("a")).unwrap();
        parent.add_child(failed_child("b")).unwrap();
        assert_eq!(parent.status(), NodeStatus::Executing);
        assert_eq!(parent.children().len(), 2);
    }

    #[test]
    fn test_df001_bubble_flags_are_independent() {
        let mut parent = ResultNode::start("p", NodeKind::Action).with_bubbling(true, false);
        parent.add_child(failed_child("a")).unwrap();
        assert_eq!(parent.status(), NodeStatus::Executing);
    }

    #[test]
    fn test_df001_bubble_stops_siblings() {
        let mut parent = ResultNode::start("p", NodeKind::Action).with_bubbling(false, true);
        assert!(parent.add_child(failed_child("a")).is_err());
        // The parent is terminal now: a sibling can no longer be attached.
        assert!(parent.add_child(ResultNode::start("b", NodeKind::Action)).is_err());
        assert_eq!(parent.children().len(), 1);
    }

    #[test]
    fn test_df001_bubble_without_child_error_synthesizes() {
        let mut child = ResultNode::start("c", NodeKind::Action);
        child.status = NodeStatus::Failure;
        let mut parent = ResultNode::start("p", NodeKind::Engine).with_bubbling(true, true);
        let err = parent.add_child(child).unwrap_err();
        assert_eq!(err.name, "MissingChildError");
    }

    #[test]
    fn test_df001_exit_codes() {
        let mut ok = ResultNode::start("a", NodeKind::Command);
        ok.succeed(None).unwrap();
        assert_eq!(ok.exit_code(), 0);
        let mut warn = ResultNode::start("a", NodeKind::Command);
        warn.warn(None).unwrap();
        assert_eq!(warn.exit_code(), 0);
        let mut fail = ResultNode::start("a", NodeKind::Command);
        fail.fail(WrappedError::validation("x", "y")).unwrap();
        assert_eq!(fail.exit_code(), 1);
        let mut err = ResultNode::start("a", NodeKind::Command);
        err.raise(WrappedError::internal("x", "y")).unwrap();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(ResultNode::start("a", NodeKind::Command).exit_code(), 2);
    }

    #[test]
    fn test_df001_children_of_kind() {
        let mut root = ResultNode::start("root", NodeKind::Engine);
        root.add_child(ResultNode::start("a", NodeKind::Action)).unwrap();
        root.add_child(ResultNode::start("p", NodeKind::ExternalProcess)).unwrap();
        assert_eq!(root.children_of_kind(NodeKind::Action).count(), 1);
    }

    #[test]
    fn test_df001_serializes_tree() {
        let mut root = ResultNode::start("root", NodeKind::Engine);
        root.add_child(failed_child("a")).unwrap();
        root.succeed(None).unwrap();
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["children"][0]["status"], "FAILURE");
        assert_eq!(json["children"][0]["error"]["category"], "EXTERNAL_TOOL");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Succeed,
        Warn,
        Fail,
        Raise,
        AddChild,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Succeed),
            Just(Op::Warn),
            Just(Op::Fail),
            Just(Op::Raise),
            Just(Op::AddChild),
        ]
    }

    fn apply(node: &mut ResultNode, op: &Op) -> Result<(), WrappedError> {
        match op {
            Op::Succeed => node.succeed(None),
            Op::Warn => node.warn(None),
            Op::Fail => node.fail(WrappedError::validation("F", "f")),
            Op::Raise => node.raise(WrappedError::internal("R", "r")),
            Op::AddChild => node.add_child(ResultNode::start("c", NodeKind::Action)),
        }
    }

    proptest! {
        /// Once terminal, every further mutation is rejected and the status holds.
        #[test]
        fn prop_df001_terminal_status_never_changes(ops in proptest::collection::vec(op_strategy(), 1..12)) {
            let mut node = ResultNode::start("n", NodeKind::Action);
            let mut settled: Option<NodeStatus> = None;
            for op in &ops {
                let result = apply(&mut node, op);
                match settled {
                    Some(status) => {
                        prop_assert!(result.is_err());
                        prop_assert_eq!(node.status(), status);
                    }
                    None => {
                        prop_assert!(result.is_ok());
                        if node.is_terminal() {
                            settled = Some(node.status());
                        }
                    }
                }
            }
        }
    }
}
