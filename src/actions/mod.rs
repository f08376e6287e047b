//! DF-020: Actions: polymorphic units of provisioning work.
//!
//! Each action:
//! 1. Validates its own options (at compile time and again before running)
//! 2. Checks preconditions before any external work
//! 3. Invokes the platform CLI through [`StepContext::tool`], attaching one
//!    process node per invocation to its action node

pub mod data;
pub mod deploy;
pub mod org;

use crate::core::debug::{DebugContext, LogLevel};
use crate::core::error::WrappedError;
use crate::core::result::{NodeKind, ResultNode};
use crate::core::types::{RecipeActionResult, TargetOrg};
use crate::transport::{interpret_output, ExternalTool, ToolInvocation};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a step needs besides its own options.
#[derive(Clone)]
pub struct StepContext {
    pub target: TargetOrg,
    pub devhub_alias: Option<String>,
    pub log_level: LogLevel,
    /// Base for relative file options.
    pub recipe_dir: PathBuf,
    pub debug: DebugContext,
    pub tool: Arc<dyn ExternalTool>,
}

impl StepContext {
    /// Resolve a file option against the recipe directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.recipe_dir.join(p)
        }
    }

    /// The dev hub alias, or a validation error naming the action.
    pub fn require_devhub(&self, action: &str) -> Result<&str, WrappedError> {
        self.devhub_alias.as_deref().ok_or_else(|| {
            WrappedError::validation(
                "DevHubRequired",
                format!(
                    "action '{}' needs a dev hub alias to manage scratch org '{}'",
                    action, self.target.alias
                ),
            )
        })
    }
}

/// A provisioning action, looked up by alias.
#[async_trait]
pub trait Action: Send + Sync {
    fn alias(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Deep validation of a step's options payload.
    fn validate_options(&self, _options: &serde_json::Value) -> Result<(), WrappedError> {
        Ok(())
    }

    /// Run the action. Process nodes are attached to `node`, which bubbles,
    /// so a failed invocation surfaces here as `Err`.
    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError>;
}

/// Alias → action table.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: IndexMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in action.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(org::CreateScratchOrg));
        registry.register(Arc::new(org::DeleteScratchOrg));
        registry.register(Arc::new(org::DisplayScratchOrg));
        registry.register(Arc::new(deploy::DeployMetadata));
        registry.register(Arc::new(deploy::InstallPackage));
        registry.register(Arc::new(data::AssignPermset));
        registry.register(Arc::new(data::ImportData));
        registry.register(Arc::new(data::ExecuteApex));
        registry
    }

    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.alias().to_string(), action);
    }

    pub fn get(&self, alias: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(alias).cloned()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

/// Deserialize an options payload, reporting problems against the action.
pub fn parse_options<T: DeserializeOwned>(
    action: &str,
    options: &serde_json::Value,
) -> Result<T, WrappedError> {
    serde_json::from_value(options.clone()).map_err(|e| {
        WrappedError::validation(
            "InvalidActionOptions",
            format!("invalid options for action '{}': {}", action, e),
        )
    })
}

/// A finished tool run whose process node has not been attached yet.
pub struct ToolCall {
    node: ResultNode,
    outcome: Result<serde_json::Value, WrappedError>,
}

impl ToolCall {
    /// Attach to `parent`; a failed call bubbles through it.
    pub fn attach(mut self, parent: &mut ResultNode) -> Result<serde_json::Value, WrappedError> {
        match self.outcome {
            Ok(value) => {
                self.node.succeed(None)?;
                parent.add_child(self.node)?;
                Ok(value)
            }
            Err(err) => {
                self.node.fail(err.clone())?;
                parent.add_child(self.node)?;
                Err(err)
            }
        }
    }

    /// Attach a failed call as WARNING so it does not bubble. The inner
    /// result carries the tool outcome; the outer one only node errors.
    pub fn attach_tolerant(
        mut self,
        parent: &mut ResultNode,
    ) -> Result<Result<serde_json::Value, WrappedError>, WrappedError> {
        match self.outcome {
            Ok(value) => {
                self.node.succeed(None)?;
                parent.add_child(self.node)?;
                Ok(Ok(value))
            }
            Err(err) => {
                let mut detail = self.node.detail().clone();
                detail["tolerated"] = serde_json::to_value(&err)?;
                self.node.warn(Some(detail))?;
                parent.add_child(self.node)?;
                Ok(Err(err))
            }
        }
    }
}

/// Run one tool invocation with `--json` and the step's log level.
pub async fn call_tool(ctx: &StepContext, invocation: ToolInvocation) -> ToolCall {
    let invocation = invocation
        .arg("--json")
        .flag("--loglevel", ctx.log_level.to_string());
    let name = invocation.display(ctx.tool.binary());
    let mut node = ResultNode::start(name.clone(), NodeKind::ExternalProcess)
        .with_bubbling(true, true)
        .with_detail(serde_json::json!({
            "command": invocation.command,
            "args": invocation.args,
        }));
    ctx.debug.debug("transport", &name);

    let outcome = match ctx.tool.invoke(&invocation).await {
        Ok(out) => {
            let detail = serde_json::json!({
                "command": invocation.command,
                "args": invocation.args,
                "exitCode": out.exit_code,
                "stdout": out.stdout,
                "stderr": out.stderr,
            });
            ctx.debug.debug_value("transport", "tool output", &detail);
            let outcome = interpret_output(&out);
            if let Err(e) = node.set_detail(detail) {
                return ToolCall { node, outcome: Err(e) };
            }
            outcome
        }
        Err(e) => Err(e),
    };

    let outcome = outcome.map_err(|mut e| {
        e.add_provenance(node.provenance_line(&e.message));
        e
    });
    ToolCall { node, outcome }
}

/// [`call_tool`] and attach; the common case.
pub async fn run_tool(
    ctx: &StepContext,
    node: &mut ResultNode,
    invocation: ToolInvocation,
) -> Result<serde_json::Value, WrappedError> {
    call_tool(ctx, invocation).await.attach(node)
}
