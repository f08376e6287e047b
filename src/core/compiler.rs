//! DF-006: Recipe compilation: raw document + options to an executable context.
//!
//! Stages, in order: document shape, target, skip sets, refresh groups,
//! dispatch map. Every stage stops at the first problem.

use super::debug::{DebugContext, LogLevel};
use super::error::WrappedError;
use super::prompt::{Choice, Prompter};
use super::recipe::validate_document;
use super::types::{
    CompileOptions, ExecutionPlan, PlannedGroup, PlannedStep, RecipeDocument, RecipeStep,
    StepGroup, TargetOrg,
};
use crate::actions::{Action, ActionRegistry};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PREBUILD_REFRESH_GROUP: &str = "prebuild-refresh-target";
pub const POSTBUILD_DETAILS_GROUP: &str = "postbuild-target-details";

/// Everything the executor needs. Moved into `execute`, so it runs once.
pub struct CompiledRecipeContext {
    pub(crate) recipe_name: String,
    pub(crate) target: TargetOrg,
    pub(crate) devhub_alias: Option<String>,
    pub(crate) step_groups: Vec<StepGroup>,
    pub(crate) skip_groups: BTreeSet<String>,
    pub(crate) skip_actions: BTreeSet<String>,
    pub(crate) halt_on_error: bool,
    pub(crate) log_level: LogLevel,
    pub(crate) recipe_dir: PathBuf,
    pub(crate) debug: DebugContext,
    pub(crate) actions: IndexMap<String, Arc<dyn Action>>,
}

impl std::fmt::Debug for CompiledRecipeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRecipeContext")
            .field("recipe_name", &self.recipe_name)
            .field("target", &self.target.alias)
            .field("groups", &self.step_groups.len())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CompiledRecipeContext {
    pub fn recipe_name(&self) -> &str {
        &self.recipe_name
    }

    pub fn target(&self) -> &TargetOrg {
        &self.target
    }

    pub fn devhub_alias(&self) -> Option<&str> {
        self.devhub_alias.as_deref()
    }

    pub fn step_groups(&self) -> &[StepGroup] {
        &self.step_groups
    }

    pub fn skip_groups(&self) -> &BTreeSet<String> {
        &self.skip_groups
    }

    pub fn skip_actions(&self) -> &BTreeSet<String> {
        &self.skip_actions
    }

    pub fn halt_on_error(&self) -> bool {
        self.halt_on_error
    }

    pub fn recipe_dir(&self) -> &Path {
        &self.recipe_dir
    }

    /// Serializable view of what will run.
    pub fn plan(&self) -> ExecutionPlan {
        let groups = self
            .step_groups
            .iter()
            .map(|g| PlannedGroup {
                alias: g.alias.clone(),
                name: g.step_group_name.clone(),
                synthetic: g.synthetic,
                skipped: self.skip_groups.contains(&g.alias),
                steps: g
                    .recipe_steps
                    .iter()
                    .map(|s| PlannedStep {
                        name: s.step_name.clone(),
                        action: s.action.clone(),
                        skipped: self.skip_actions.contains(&s.action),
                        options: s.options.clone(),
                    })
                    .collect(),
            })
            .collect();

        ExecutionPlan {
            recipe_name: self.recipe_name.clone(),
            target_alias: self.target.alias.clone(),
            target_is_scratch_org: self.target.is_scratch_org,
            devhub_alias: self.devhub_alias.clone(),
            halt_on_error: self.halt_on_error,
            skip_groups: self.skip_groups.iter().cloned().collect(),
            skip_actions: self.skip_actions.iter().cloned().collect(),
            groups,
        }
    }

    /// BLAKE3 of the serialized plan.
    pub fn fingerprint(&self) -> Result<String, WrappedError> {
        let bytes = serde_json::to_vec(&self.plan())?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

/// Turns raw recipe documents into [`CompiledRecipeContext`]s.
pub struct RecipeCompiler {
    registry: ActionRegistry,
    prompter: Arc<dyn Prompter>,
    default_devhub: Option<String>,
}

impl RecipeCompiler {
    pub fn new(registry: ActionRegistry, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            registry,
            prompter,
            default_devhub: None,
        }
    }

    /// Dev hub used when compile options name none.
    pub fn with_default_devhub(mut self, alias: Option<String>) -> Self {
        self.default_devhub = alias;
        self
    }

    pub async fn compile(
        &self,
        raw: &serde_json::Value,
        opts: &CompileOptions,
        recipe_dir: impl Into<PathBuf>,
        debug: DebugContext,
    ) -> Result<CompiledRecipeContext, WrappedError> {
        let doc = validate_document(raw)?;
        debug.debug("compiler", "document shape validated");

        let (target, interactive) = self.resolve_target(&doc, opts).await?;
        debug.debug("compiler", &format!("target resolved: {}", target.alias));

        let (skip_groups, skip_actions) = self.resolve_skips(&doc, opts).await?;

        let mut step_groups = doc.recipe_step_groups.clone();
        if target.is_scratch_org && !opts.skip_target_refresh {
            if interactive {
                let proceed = self
                    .prompter
                    .confirm(
                        &format!(
                            "Target '{}' is a scratch org. Delete and recreate it before building?",
                            target.alias
                        ),
                        true,
                    )
                    .await?;
                if !proceed {
                    return Err(cancelled("target refresh declined"));
                }
            }
            step_groups.insert(0, prebuild_refresh_group(&target));
            step_groups.push(postbuild_details_group(&target));
        }

        let actions = self.build_dispatch(&step_groups)?;

        let compiled = CompiledRecipeContext {
            recipe_name: doc.display_name().to_string(),
            target,
            devhub_alias: opts
                .devhub_alias
                .clone()
                .or_else(|| self.default_devhub.clone()),
            step_groups,
            skip_groups,
            skip_actions,
            halt_on_error: opts.halt_on_error.unwrap_or(doc.options.halt_on_error),
            log_level: opts.log_level.unwrap_or(debug.log_level()),
            recipe_dir: recipe_dir.into(),
            debug,
            actions,
        };

        tracing::info!(
            recipe = %compiled.recipe_name,
            target = %compiled.target.alias,
            groups = compiled.step_groups.len(),
            skipped_groups = compiled.skip_groups.len(),
            halt_on_error = compiled.halt_on_error,
            "recipe_compiled"
        );
        Ok(compiled)
    }

    /// Returns the target and whether the operator picked it.
    async fn resolve_target(
        &self,
        doc: &RecipeDocument,
        opts: &CompileOptions,
    ) -> Result<(TargetOrg, bool), WrappedError> {
        let targets = &doc.options.target_orgs;

        if let Some(alias) = opts.target_org_alias.as_deref() {
            return targets
                .iter()
                .find(|t| t.alias == alias)
                .cloned()
                .map(|t| (t, false))
                .ok_or_else(|| {
                    let known: Vec<&str> = targets.iter().map(|t| t.alias.as_str()).collect();
                    WrappedError::validation(
                        "UnknownTargetOrg",
                        format!(
                            "target org '{}' is not declared by this recipe (declared: {})",
                            alias,
                            known.join(", ")
                        ),
                    )
                });
        }

        if doc.options.no_custom_install {
            return targets
                .first()
                .cloned()
                .map(|t| (t, false))
                .ok_or_else(|| WrappedError::validation("NoTargetOrg", "recipe declares no target org"));
        }

        let mut choices: Vec<Choice> = targets
            .iter()
            .map(|t| Choice::new(format!("{} ({})", t.org_name, t.alias), t.description.clone()))
            .collect();
        choices.push(Choice::new("Cancel", ""));

        let picked = self
            .prompter
            .select("Choose a target org", &choices)
            .await?;
        match targets.get(picked) {
            Some(t) => Ok((t.clone(), true)),
            None if picked == targets.len() => Err(cancelled("no target org chosen")),
            None => Err(WrappedError::internal(
                "InvalidSelection",
                format!("selection {} is out of range", picked),
            )),
        }
    }

    async fn resolve_skips(
        &self,
        doc: &RecipeDocument,
        opts: &CompileOptions,
    ) -> Result<(BTreeSet<String>, BTreeSet<String>), WrappedError> {
        if opts.has_explicit_skips() {
            return Ok((
                opts.skip_groups.iter().flatten().cloned().collect(),
                opts.skip_actions.iter().flatten().cloned().collect(),
            ));
        }

        let recipe_actions: BTreeSet<String> = doc.options.skip_actions.iter().cloned().collect();
        if doc.options.no_custom_install {
            return Ok((
                doc.options.skip_groups.iter().cloned().collect(),
                recipe_actions,
            ));
        }

        let groups = &doc.recipe_step_groups;
        let choices: Vec<Choice> = groups
            .iter()
            .map(|g| Choice::new(g.step_group_name.clone(), g.description.clone()))
            .collect();
        let mut checked: Vec<bool> = groups
            .iter()
            .map(|g| !doc.options.skip_groups.contains(&g.alias))
            .collect();

        loop {
            checked = self
                .prompter
                .multi_select("Select the step groups to run", &choices, &checked)
                .await?;
            if checked.len() != groups.len() {
                return Err(WrappedError::internal(
                    "InvalidSelection",
                    format!(
                        "expected {} step group flags, got {}",
                        groups.len(),
                        checked.len()
                    ),
                ));
            }

            let selected = checked.iter().filter(|c| **c).count();
            let next = self
                .prompter
                .select(
                    &format!("Run {} of {} step groups?", selected, groups.len()),
                    &[
                        Choice::new("Continue", ""),
                        Choice::new("Make changes", ""),
                        Choice::new("Cancel", ""),
                    ],
                )
                .await?;
            match next {
                0 => break,
                1 => continue,
                _ => return Err(cancelled("step group selection cancelled")),
            }
        }

        let skip_groups = groups
            .iter()
            .zip(&checked)
            .filter(|(_, run)| !**run)
            .map(|(g, _)| g.alias.clone())
            .collect();
        Ok((skip_groups, recipe_actions))
    }

    fn build_dispatch(
        &self,
        groups: &[StepGroup],
    ) -> Result<IndexMap<String, Arc<dyn Action>>, WrappedError> {
        let mut actions: IndexMap<String, Arc<dyn Action>> = IndexMap::new();
        for group in groups {
            for step in &group.recipe_steps {
                let action = match actions.get(&step.action) {
                    Some(a) => a.clone(),
                    None => {
                        let a = self.registry.get(&step.action).ok_or_else(|| {
                            WrappedError::validation(
                                "UnknownAction",
                                format!(
                                    "step '{}' in group '{}' uses unknown action '{}'",
                                    step.step_name, group.alias, step.action
                                ),
                            )
                        })?;
                        actions.insert(step.action.clone(), a.clone());
                        a
                    }
                };
                action.validate_options(&step.options).map_err(|e| {
                    e.with_provenance(format!(
                        "Step {} in group {}: invalid options",
                        step.step_name, group.alias
                    ))
                })?;
            }
        }
        Ok(actions)
    }
}

fn cancelled(why: &str) -> WrappedError {
    WrappedError::validation("CompilationCancelled", format!("compilation cancelled: {}", why))
}

fn synthetic_group(alias: &str, name: &str, description: &str, steps: Vec<RecipeStep>) -> StepGroup {
    StepGroup {
        step_group_name: name.to_string(),
        alias: alias.to_string(),
        description: description.to_string(),
        recipe_steps: steps,
        synthetic: true,
    }
}

fn step(name: String, action: &str, options: serde_json::Value) -> RecipeStep {
    RecipeStep {
        step_name: name,
        description: String::new(),
        action: action.to_string(),
        options,
    }
}

fn prebuild_refresh_group(target: &TargetOrg) -> StepGroup {
    let alias = &target.alias;
    synthetic_group(
        PREBUILD_REFRESH_GROUP,
        "Refresh target org",
        "Delete and recreate the scratch org before building",
        vec![
            step(
                format!("Delete scratch org {}", alias),
                "delete-scratch-org",
                serde_json::json!({ "scratchOrgAlias": alias }),
            ),
            step(
                format!("Create scratch org {}", alias),
                "create-scratch-org",
                serde_json::json!({
                    "scratchOrgAlias": alias,
                    "scratchDefJson": target.scratch_def_json,
                }),
            ),
        ],
    )
}

fn postbuild_details_group(target: &TargetOrg) -> StepGroup {
    synthetic_group(
        POSTBUILD_DETAILS_GROUP,
        "Target org details",
        "Show connection details for the rebuilt scratch org",
        vec![step(
            format!("Display scratch org {}", target.alias),
            "display-scratch-org",
            serde_json::json!({ "scratchOrgAlias": target.alias }),
        )],
    )
}
