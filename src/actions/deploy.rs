//! DF-022: Metadata deployment and package installation.

use super::{parse_options, run_tool, Action, StepContext};
use crate::core::error::{ErrorCategory, WrappedError};
use crate::core::result::ResultNode;
use crate::core::types::RecipeActionResult;
use crate::transport::ToolInvocation;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

const DEFAULT_WAIT_MINUTES: u32 = 10;

static PACKAGE_VERSION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^04t[A-Za-z0-9]{12}(?:[A-Za-z0-9]{3})?$").expect("package id pattern is valid")
});

fn default_wait() -> u32 {
    DEFAULT_WAIT_MINUTES
}

// ============================================================================
// deploy-metadata
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeployOptions {
    mdapi_source: String,
    #[serde(default = "default_wait")]
    wait_minutes: u32,
}

/// `force:mdapi:deploy` of a metadata API directory.
pub struct DeployMetadata;

#[async_trait]
impl Action for DeployMetadata {
    fn alias(&self) -> &'static str {
        "deploy-metadata"
    }

    fn description(&self) -> &'static str {
        "Deploy a metadata API source directory to the target"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        parse_options::<DeployOptions>(self.alias(), options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts: DeployOptions = parse_options(self.alias(), options)?;
        let source = ctx.resolve_path(&opts.mdapi_source);
        if !source.is_dir() {
            return Err(WrappedError::validation(
                "FileNotFound",
                format!("metadata source directory not found: {}", source.display()),
            ));
        }

        let invocation = ToolInvocation::new("force:mdapi:deploy")
            .flag("-d", source.display().to_string())
            .flag("-u", ctx.target.alias.as_str())
            .flag("-w", opts.wait_minutes.to_string());
        let result = run_tool(ctx, node, invocation).await?;

        // Deploys report their own outcome inside a successful envelope.
        match result.get("status").and_then(|s| s.as_str()) {
            None | Some("Succeeded") => {}
            Some(status) => {
                let mut err = WrappedError::new(
                    ErrorCategory::ExternalTool,
                    "DeployFailed",
                    format!("deployment finished with status {}", status),
                );
                err.raw_payload = Some(result.to_string());
                return Err(err);
            }
        }

        let deployed = result
            .get("numberComponentsDeployed")
            .and_then(|n| n.as_i64())
            .unwrap_or(0);
        Ok(RecipeActionResult::ok(
            format!(
                "deployed {} component(s) from {}",
                deployed, opts.mdapi_source
            ),
            result,
        ))
    }
}

// ============================================================================
// install-package
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct InstallOptions {
    package_version_id: String,
    #[serde(default)]
    installation_key: Option<String>,
    #[serde(default = "default_wait")]
    wait_minutes: u32,
}

impl InstallOptions {
    fn parse(options: &serde_json::Value) -> Result<Self, WrappedError> {
        let opts: Self = parse_options(InstallPackage.alias(), options)?;
        if !PACKAGE_VERSION_ID.is_match(&opts.package_version_id) {
            return Err(WrappedError::validation(
                "InvalidActionOptions",
                format!(
                    "packageVersionId '{}' is not a package version id (04t...)",
                    opts.package_version_id
                ),
            ));
        }
        Ok(opts)
    }
}

/// `force:package:install` of a package version.
pub struct InstallPackage;

#[async_trait]
impl Action for InstallPackage {
    fn alias(&self) -> &'static str {
        "install-package"
    }

    fn description(&self) -> &'static str {
        "Install a package version into the target"
    }

    fn validate_options(&self, options: &serde_json::Value) -> Result<(), WrappedError> {
        InstallOptions::parse(options).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        let opts = InstallOptions::parse(options)?;

        let invocation = ToolInvocation::new("force:package:install")
            .flag("-p", opts.package_version_id.as_str())
            .flag("-u", ctx.target.alias.as_str())
            .flag("-w", opts.wait_minutes.to_string())
            .flag_opt("-k", opts.installation_key.as_deref())
            .arg("-r");
        let result = run_tool(ctx, node, invocation).await?;

        let mut res = RecipeActionResult::ok(
            format!("installed package {}", opts.package_version_id),
            result,
        );
        let status = res
            .structured
            .get("Status")
            .and_then(|s| s.as_str())
            .map(str::to_string);
        if let Some(status) = status.filter(|s| s != "SUCCESS") {
            res = res.with_warning(format!("install request finished with status {}", status));
        }
        Ok(res)
    }
}
