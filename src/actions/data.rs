//! DF-023: Post-deploy configuration: permission sets, sample data, Apex.

use super::{parse_options, run_tool, Action, StepContext};
use crate::core::error::{ErrorCategory, WrappedError};
use crate::core::result::ResultNode;
use crate::core::types::RecipeActionResult;
use crate::transport::ToolInvocation;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

fn require_file(ctx: &StepContext, path: &str, what: &str) -> Result<PathBuf, WrappedError> {
    let resolved = ctx.resolve_path(path);
    if !resolved.is_file() {
        return Err(WrappedError::validation(
            "FileNotFound",
            format!("{} not found: {}", what, resolved.display()),
        ));
    }
    Ok(resolved)
}

// ============================================================================
// assign-permset
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PermsetOptions {
    perm_set_name: OneOrMany,
}

impl PermsetOptions {
    fn parse(options: &serde_json::Value) -> Result<Self, WrappedError> {
        let opts: Self = parse_options(AssignPermset.alias(), options)?;
        let names = opts.perm_set_name.names();
        if names.is_empty() || names.iter().any(|n| n.trim().is_empty()) {
            return Err(WrappedError::validation(
                "InvalidActionOptions",
                "permSetName must name at least one permission set",
            ));
        }
        Ok(opts)
    }
}

/// `force:user:permset:assign` for the default user of the target.
pub struct AssignPermset;

#[async_trait]
impl Action for AssignPermset {
    fn alias(&self) -> &'static str {
        "assign-permset"
    }

    fn description(&self) -> &'static str {
        "Assign one or more permission sets to the target's default user"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        PermsetOptions::parse(options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts = PermsetOptions::parse(options)?;
        let names = opts.perm_set_name.names().join(",");

        let invocation = ToolInvocation::new("force:user:permset:assign")
            .flag("-n", names.as_str())
            .flag("-u", ctx.target.alias.as_str());
        let result = run_tool(ctx, node, invocation).await?;

        let failures: Vec<String> = result
            .get("failures")
            .and_then(|f| f.as_array())
            .map(|list| {
                list.iter()
                    .map(|f| {
                        f.get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("assignment failed")
                            .to_string()
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut res = RecipeActionResult::ok(format!("assigned {}", names), result);
        for failure in failures {
            res = res.with_warning(failure);
        }
        Ok(res)
    }
}

// ============================================================================
// import-data
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ImportOptions {
    plan: String,
}

/// `force:data:tree:import` from a data plan file.
pub struct ImportData;

#[async_trait]
impl Action for ImportData {
    fn alias(&self) -> &'static str {
        "import-data"
    }

    fn description(&self) -> &'static str {
        "Import sample records from a data tree plan"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        parse_options::<ImportOptions>(self.alias(), options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts: ImportOptions = parse_options(self.alias(), options)?;
        let plan = require_file(ctx, &opts.plan, "data plan")?;

        let invocation = ToolInvocation::new("force:data:tree:import")
            .flag("-p", plan.display().to_string())
            .flag("-u", ctx.target.alias.as_str());
        let result = run_tool(ctx, node, invocation).await?;

        let records = result.as_array().map(Vec::len).unwrap_or(0);
        Ok(RecipeActionResult::ok(
            format!("imported {} record(s) from {}", records, opts.plan),
            result,
        ))
    }
}

// ============================================================================
// execute-apex
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ApexOptions {
    apex_code_file: String,
}

/// `force:apex:execute` of an anonymous Apex file.
pub struct ExecuteApex;

#[async_trait]
impl Action for ExecuteApex {
    fn alias(&self) -> &'static str {
        "execute-apex"
    }

    fn description(&self) -> &'static str {
        "Run an anonymous Apex script against the target"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        parse_options::<ApexOptions>(self.alias(), options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts: ApexOptions = parse_options(self.alias(), options)?;
        let file = require_file(ctx, &opts.apex_code_file, "apex file")?;

        let invocation = ToolInvocation::new("force:apex:execute")
            .flag("-f", file.display().to_string())
            .flag("-u", ctx.target.alias.as_str());
        let result = run_tool(ctx, node, invocation).await?;

        let flag = |key: &str| result.get(key).and_then(|v| v.as_bool()).unwrap_or(true);
        if !flag("compiled") || !flag("success") {
            let message = ["compileProblem", "exceptionMessage"]
                .iter()
                .filter_map(|k| result.get(*k).and_then(|v| v.as_str()))
                .find(|m| !m.is_empty())
                .unwrap_or("anonymous apex did not succeed")
                .to_string();
            let mut err = WrappedError::new(ErrorCategory::ExternalTool, "ApexExecutionFailed", message);
            if let Some(trace) = result.get("exceptionStackTrace").and_then(|v| v.as_str()) {
                err.remediation.push(format!("stack trace: {}", trace));
            }
            return Err(err);
        }

        Ok(RecipeActionResult::ok(
            format!("executed {}", opts.apex_code_file),
            result,
        ))
    }
}
