//! DF-021: Scratch org lifecycle actions.
//!
//! Create and delete go through the dev hub; display only needs the org
//! alias. A missing org on delete is tolerated by default so that refresh
//! groups work on first run.

use super::{call_tool, parse_options, run_tool, Action, StepContext};
use crate::core::error::{ErrorCategory, WrappedError};
use crate::core::result::ResultNode;
use crate::core::types::RecipeActionResult;
use crate::transport::ToolInvocation;
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_DURATION_DAYS: u32 = 7;
const MAX_DURATION_DAYS: u32 = 30;

fn default_duration() -> u32 {
    DEFAULT_DURATION_DAYS
}

fn default_true() -> bool {
    true
}

// ============================================================================
// create-scratch-org
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateOptions {
    scratch_org_alias: String,
    scratch_def_json: String,
    #[serde(default = "default_duration")]
    duration_days: u32,
}

impl CreateOptions {
    fn parse(options: &serde_json::Value) -> Result<Self, WrappedError> {
        let opts: Self = parse_options(CreateScratchOrg.alias(), options)?;
        if !(1..=MAX_DURATION_DAYS).contains(&opts.duration_days) {
            return Err(WrappedError::validation(
                "InvalidActionOptions",
                format!(
                    "durationDays must be between 1 and {}, got {}",
                    MAX_DURATION_DAYS, opts.duration_days
                ),
            ));
        }
        Ok(opts)
    }
}

/// `force:org:create` against the dev hub.
pub struct CreateScratchOrg;

#[async_trait]
impl Action for CreateScratchOrg {
    fn alias(&self) -> &'static str {
        "create-scratch-org"
    }

    fn description(&self) -> &'static str {
        "Create a scratch org from a definition file"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        CreateOptions::parse(options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts = CreateOptions::parse(options)?;
        let devhub = ctx.require_devhub(self.alias())?;
        let def_file = ctx.resolve_path(&opts.scratch_def_json);
        if !def_file.is_file() {
            return Err(WrappedError::validation(
                "FileNotFound",
                format!("scratch org definition not found: {}", def_file.display()),
            ));
        }

        let invocation = ToolInvocation::new("force:org:create")
            .flag("-f", def_file.display().to_string())
            .flag("-a", opts.scratch_org_alias.as_str())
            .flag("-v", devhub)
            .flag("-d", opts.duration_days.to_string());
        let result = run_tool(ctx, node, invocation).await?;

        let username = result
            .get("username")
            .and_then(|u| u.as_str())
            .unwrap_or("unknown user");
        Ok(RecipeActionResult::ok(
            format!(
                "created scratch org '{}' ({})",
                opts.scratch_org_alias, username
            ),
            result,
        ))
    }
}

// ============================================================================
// delete-scratch-org
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeleteOptions {
    scratch_org_alias: String,
    #[serde(default = "default_true")]
    ignore_missing: bool,
}

/// `force:org:delete` against the dev hub.
pub struct DeleteScratchOrg;

#[async_trait]
impl Action for DeleteScratchOrg {
    fn alias(&self) -> &'static str {
        "delete-scratch-org"
    }

    fn description(&self) -> &'static str {
        "Delete a scratch org"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        parse_options::<DeleteOptions>(self.alias(), options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts: DeleteOptions = parse_options(self.alias(), options)?;
        let devhub = ctx.require_devhub(self.alias())?;

        let invocation = ToolInvocation::new("force:org:delete")
            .flag("-u", opts.scratch_org_alias.as_str())
            .flag("-v", devhub)
            .arg("-p");
        let call = call_tool(ctx, invocation).await;

        if !opts.ignore_missing {
            let result = call.attach(node)?;
            return Ok(RecipeActionResult::ok(
                format!("deleted scratch org '{}'", opts.scratch_org_alias),
                result,
            ));
        }

        match call.attach_tolerant(node)? {
            Ok(result) => Ok(RecipeActionResult::ok(
                format!("deleted scratch org '{}'", opts.scratch_org_alias),
                result,
            )),
            Err(err) if err.category == ErrorCategory::ExternalTool => Ok(RecipeActionResult::ok(
                format!("scratch org '{}' was not deleted", opts.scratch_org_alias),
                serde_json::Value::Null,
            )
            .with_warning(format!("{}: {}", err.name, err.message))),
            Err(err) => Err(err),
        }
    }
}

// ============================================================================
// display-scratch-org
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DisplayOptions {
    #[serde(default)]
    scratch_org_alias: Option<String>,
}

/// `force:org:display`; defaults to the compiled target.
pub struct DisplayScratchOrg;

#[async_trait]
impl Action for DisplayScratchOrg {
    fn alias(&self) -> &'static str {
        "display-scratch-org"
    }

    fn description(&self) -> &'static str {
        "Show connection details for an org"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        display_options(options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts = display_options(options)?;
        let alias = opts
            .scratch_org_alias
            .unwrap_or_else(|| ctx.target.alias.clone());

        let invocation = ToolInvocation::new("force:org:display").flag("-u", alias.as_str());
        let result = run_tool(ctx, node, invocation).await?;

        let field = |key: &str| {
            result
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string()
        };
        Ok(RecipeActionResult::ok(
            format!(
                "org '{}': {} at {}",
                alias,
                field("username"),
                field("instanceUrl")
            ),
            result.clone(),
        ))
    }
}

fn display_options(options: &serde_json::Value) -> Result<DisplayOptions, WrappedError> {
    if options.is_null() {
        return Ok(DisplayOptions::default());
    }
    parse_options(DisplayScratchOrg.alias(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::result::{NodeKind, NodeStatus};
    use crate::testing::{step_context, ScriptedTool};
    use serde_json::json;

    fn action_node() -> ResultNode {
        ResultNode::start("step", NodeKind::Action).with_bubbling(true, true)
    }

    #[test]
    fn test_df021_create_options_validation() {
        let a = CreateScratchOrg;
        assert!(a
            .validate_options(&json!({"scratchOrgAlias": "demo", "scratchDefJson": "def.json"}))
            .is_ok());
        assert!(a
            .validate_options(&json!({"scratchOrgAlias": "demo"}))
            .is_err());
        let err = a
            .validate_options(&json!({
                "scratchOrgAlias": "demo", "scratchDefJson": "def.json", "durationDays": 45
            }))
            .unwrap_err();
        assert!(err.message.contains("durationDays"));
        assert!(a
            .validate_options(&json!({
                "scratchOrgAlias": "demo", "scratchDefJson": "def.json", "bogus": 1
            }))
            .is_err());
    }

    #[tokio::test]
    async fn test_df021_create_requires_devhub() {
        let tool = ScriptedTool::new();
        let ctx = step_context(tool.clone(), false);
        let mut node = action_node();
        let err = CreateScratchOrg
            .execute(
                &ctx,
                &json!({"scratchOrgAlias": "demo", "scratchDefJson": "def.json"}),
                &mut node,
            )
            .await
            .unwrap_err();
        assert_eq!(err.name, "DevHubRequired");
        assert!(tool.calls().is_empty());
    }

    #[tokio::test]
    async fn test_df021_create_invokes_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("def.json"), "{}").unwrap();
        let tool = ScriptedTool::new()
            .respond_json(json!({"status": 0, "result": {"username": "test@example.com"}}));
        let mut ctx = step_context(tool.clone(), true);
        ctx.recipe_dir = dir.path().to_path_buf();
        let mut node = action_node();

        let res = CreateScratchOrg
            .execute(
                &ctx,
                &json!({"scratchOrgAlias": "demo", "scratchDefJson": "def.json", "durationDays": 3}),
                &mut node,
            )
            .await
            .unwrap();
        assert!(res.result.contains("test@example.com"));

        let call = &tool.calls()[0];
        assert_eq!(call.command, "force:org:create");
        let def = dir.path().join("def.json").display().to_string();
        assert_eq!(
            &call.args[..8],
            &["-f", def.as_str(), "-a", "demo", "-v", "my-hub", "-d", "3"]
        );
        assert_eq!(node.children().len(), 1);
    }

    #[tokio::test]
    async fn test_df021_create_missing_definition_file() {
        let tool = ScriptedTool::new();
        let ctx = step_context(tool.clone(), true);
        let mut node = action_node();
        let err = CreateScratchOrg
            .execute(
                &ctx,
                &json!({"scratchOrgAlias": "demo", "scratchDefJson": "missing.json"}),
                &mut node,
            )
            .await
            .unwrap_err();
        assert_eq!(err.name, "FileNotFound");
        assert!(tool.calls().is_empty());
    }

    #[tokio::test]
    async fn test_df021_delete_missing_org_is_warning() {
        let tool = ScriptedTool::new().respond_json(json!({
            "status": 1, "name": "NoOrgFound", "message": "No org configuration found for name demo"
        }));
        let ctx = step_context(tool, true);
        let mut node = action_node();
        let res = DeleteScratchOrg
            .execute(&ctx, &json!({"scratchOrgAlias": "demo"}), &mut node)
            .await
            .unwrap();
        assert_eq!(res.warnings.len(), 1);
        assert!(res.warnings[0].starts_with("NoOrgFound"));
        assert_eq!(node.status(), NodeStatus::Executing);
        assert_eq!(node.children()[0].status(), NodeStatus::Warning);
    }

    #[tokio::test]
    async fn test_df021_delete_strict_fails() {
        let tool = ScriptedTool::new().respond_json(json!({
            "status": 1, "name": "NoOrgFound", "message": "no org"
        }));
        let ctx = step_context(tool, true);
        let mut node = action_node();
        let err = DeleteScratchOrg
            .execute(
                &ctx,
                &json!({"scratchOrgAlias": "demo", "ignoreMissing": false}),
                &mut node,
            )
            .await
            .unwrap_err();
        assert_eq!(err.name, "NoOrgFound");
        assert_eq!(node.status(), NodeStatus::Failure);
    }

    #[tokio::test]
    async fn test_df021_display_defaults_to_target() {
        let tool = ScriptedTool::new().respond_json(json!({
            "status": 0,
            "result": {"username": "u@example.com", "instanceUrl": "https://x.my.salesforce.com"}
        }));
        let ctx = step_context(tool.clone(), false);
        let mut node = action_node();
        let res = DisplayScratchOrg
            .execute(&ctx, &json!({}), &mut node)
            .await
            .unwrap();
        assert_eq!(
            res.result,
            "org 'demo-org': u@example.com at https://x.my.salesforce.com"
        );
        assert_eq!(&tool.calls()[0].args[..2], &["-u", "demo-org"]);
    }
}
