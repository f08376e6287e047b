//! DF-003: Recipe document, compile options, and plan types.
//!
//! The recipe document is camelCase JSON (or YAML) as written by recipe
//! authors. All document types derive `JsonSchema` so `demoforge schema`
//! can publish the format.

use super::debug::LogLevel;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// Recipe document
// ============================================================================

/// Root of a recipe file: an ordered provisioning plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDocument {
    /// Schema version (major version must be 1)
    pub schema_version: String,

    /// Human-readable recipe name
    #[serde(default)]
    pub recipe_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub recipe_version: Option<String>,

    /// Step groups, executed in declaration order
    pub recipe_step_groups: Vec<StepGroup>,

    /// Recipe-wide options
    pub options: RecipeOptions,
}

impl RecipeDocument {
    /// Display name, falling back to a generic label.
    pub fn display_name(&self) -> &str {
        self.recipe_name.as_deref().unwrap_or("recipe")
    }
}

/// Recipe-wide options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecipeOptions {
    /// Environments this recipe may run against; the first is the default
    pub target_orgs: Vec<TargetOrg>,

    /// Step-group aliases skipped by default
    #[serde(default)]
    pub skip_groups: Vec<String>,

    /// Action aliases skipped by default
    #[serde(default)]
    pub skip_actions: Vec<String>,

    /// Stop at the first failed step
    pub halt_on_error: bool,

    /// Forbid interactive customization of target and step groups
    pub no_custom_install: bool,
}

/// An eligible target environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetOrg {
    pub org_name: String,

    /// Alias the platform CLI knows this environment by
    pub alias: String,

    #[serde(default)]
    pub description: String,

    /// Ephemeral, on-demand environment that needs a dev hub to create
    pub is_scratch_org: bool,

    /// Environment definition file (required for scratch orgs)
    #[serde(default)]
    pub scratch_def_json: Option<String>,
}

/// A named, orderable collection of steps, skippable as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepGroup {
    pub step_group_name: String,
    pub alias: String,

    #[serde(default)]
    pub description: String,

    pub recipe_steps: Vec<RecipeStep>,

    /// Injected by the compiler rather than written in the recipe
    #[serde(skip)]
    pub synthetic: bool,
}

/// One step: an action alias plus its options payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecipeStep {
    pub step_name: String,

    #[serde(default)]
    pub description: String,

    /// Action alias, resolved through the action registry
    pub action: String,

    #[serde(default)]
    pub options: serde_json::Value,
}

// ============================================================================
// Compile options
// ============================================================================

/// Caller-resolved options for one compile. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    #[serde(default)]
    pub target_org_alias: Option<String>,

    #[serde(default)]
    pub skip_groups: Option<Vec<String>>,

    #[serde(default)]
    pub skip_actions: Option<Vec<String>>,

    #[serde(default)]
    pub halt_on_error: Option<bool>,

    #[serde(default)]
    pub devhub_alias: Option<String>,

    #[serde(default)]
    pub log_level: Option<LogLevel>,

    /// Do not delete and recreate an ephemeral target before building
    #[serde(default)]
    pub skip_target_refresh: bool,
}

impl CompileOptions {
    /// Whether explicit skip lists were supplied (either one).
    pub fn has_explicit_skips(&self) -> bool {
        self.skip_groups.is_some() || self.skip_actions.is_some()
    }
}

// ============================================================================
// Plan view
// ============================================================================

/// Serializable view of a compiled recipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub recipe_name: String,
    pub target_alias: String,
    pub target_is_scratch_org: bool,
    pub devhub_alias: Option<String>,
    pub halt_on_error: bool,
    pub skip_groups: Vec<String>,
    pub skip_actions: Vec<String>,
    pub groups: Vec<PlannedGroup>,
}

impl ExecutionPlan {
    /// Number of steps that will actually run.
    pub fn runnable_steps(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| !g.skipped)
            .flat_map(|g| &g.steps)
            .filter(|s| !s.skipped)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedGroup {
    pub alias: String,
    pub name: String,
    pub synthetic: bool,
    pub skipped: bool,
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub name: String,
    pub action: String,
    pub skipped: bool,
    pub options: serde_json::Value,
}

// ============================================================================
// Action result
// ============================================================================

/// What an action hands back to the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeActionResult {
    pub status_code: i64,
    pub result: String,
    pub structured: serde_json::Value,

    /// Non-fatal findings; a non-empty list marks the step WARNING
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RecipeActionResult {
    pub fn ok(result: impl Into<String>, structured: serde_json::Value) -> Self {
        Self {
            status_code: 0,
            result: result.into(),
            structured,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}
