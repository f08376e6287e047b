//! DF-007: Executor: drives a compiled recipe through its actions.
//!
//! group → (skip?) → step → (skip?) → action → result node → halt check
//!
//! The engine root never bubbles: every step outcome is recorded, and the
//! root status is decided once the loop ends.

use super::compiler::CompiledRecipeContext;
use super::error::WrappedError;
use super::result::{NodeKind, NodeStatus, ResultNode};
use super::types::{RecipeStep, StepGroup};
use crate::actions::StepContext;
use crate::transport::ExternalTool;
use std::sync::Arc;
use std::time::Instant;

/// Counters reported on the engine root.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub steps_run: usize,
    pub steps_failed: usize,
    pub steps_warned: usize,
    pub steps_skipped: usize,
    pub groups_skipped: usize,
    pub halted: bool,
}

pub struct RecipeExecutor {
    tool: Arc<dyn ExternalTool>,
}

impl RecipeExecutor {
    pub fn new(tool: Arc<dyn ExternalTool>) -> Self {
        Self { tool }
    }

    /// Run every step. `Err` only on internal invariant violations; step
    /// failures are reported through the returned tree.
    pub async fn execute(
        &self,
        compiled: CompiledRecipeContext,
    ) -> Result<ResultNode, WrappedError> {
        let start = Instant::now();
        let mut root = ResultNode::start(compiled.recipe_name.clone(), NodeKind::Engine);
        let ctx = StepContext {
            target: compiled.target.clone(),
            devhub_alias: compiled.devhub_alias.clone(),
            log_level: compiled.log_level,
            recipe_dir: compiled.recipe_dir.clone(),
            debug: compiled.debug.clone(),
            tool: self.tool.clone(),
        };

        let mut summary = RunSummary::default();
        let mut first_failure: Option<WrappedError> = None;

        'groups: for group in &compiled.step_groups {
            if compiled.skip_groups.contains(&group.alias) {
                tracing::info!(group = %group.alias, "group_skipped");
                summary.groups_skipped += 1;
                root.add_child(skipped_node(
                    &group.step_group_name,
                    serde_json::json!({
                        "skipped": "group",
                        "group": group.alias,
                        "reason": "group skipped",
                    }),
                )?)?;
                continue;
            }

            for step in &group.recipe_steps {
                if compiled.skip_actions.contains(&step.action) {
                    tracing::info!(group = %group.alias, step = %step.step_name, action = %step.action, "step_skipped");
                    summary.steps_skipped += 1;
                    root.add_child(skipped_node(
                        &step.step_name,
                        serde_json::json!({
                            "skipped": "action",
                            "group": group.alias,
                            "action": step.action,
                            "reason": "action skipped",
                        }),
                    )?)?;
                    continue;
                }

                let node = self.run_step(&compiled, &ctx, group, step).await?;
                summary.steps_run += 1;

                if node.status().is_failed() {
                    summary.steps_failed += 1;
                    let err = node.error().cloned().unwrap_or_else(|| {
                        WrappedError::internal(
                            "MissingStepError",
                            format!("step '{}' failed without an error", step.step_name),
                        )
                    });
                    tracing::warn!(
                        group = %group.alias,
                        step = %step.step_name,
                        category = %err.category,
                        error = %err.message,
                        "step_failed"
                    );
                    first_failure.get_or_insert(err);
                    root.add_child(node)?;

                    if compiled.halt_on_error {
                        tracing::warn!(step = %step.step_name, "halting");
                        summary.halted = true;
                        break 'groups;
                    }
                    continue;
                }

                if node.status() == NodeStatus::Warning {
                    summary.steps_warned += 1;
                }
                tracing::info!(
                    group = %group.alias,
                    step = %step.step_name,
                    status = %node.status(),
                    duration_ms = node.duration_ms().unwrap_or(0),
                    "step_completed"
                );
                root.add_child(node)?;
            }
        }

        let detail = serde_json::json!({
            "target": compiled.target.alias,
            "haltOnError": compiled.halt_on_error,
            "stepsRun": summary.steps_run,
            "stepsFailed": summary.steps_failed,
            "stepsWarned": summary.steps_warned,
            "stepsSkipped": summary.steps_skipped,
            "groupsSkipped": summary.groups_skipped,
            "halted": summary.halted,
        });

        match first_failure {
            Some(first) => {
                let message = if summary.halted {
                    format!("halted after a failed step: {}", first.message)
                } else {
                    format!(
                        "{} of {} step(s) failed; first: {}",
                        summary.steps_failed, summary.steps_run, first.message
                    )
                };
                let mut err = WrappedError::new(first.category, "RecipeExecutionFailed", message)
                    .with_cause(first);
                err.add_provenance(root.provenance_line(&err.message));
                root.set_detail(detail)?;
                root.fail(err)?;
            }
            None => root.succeed(Some(detail))?,
        }

        tracing::info!(
            recipe = %compiled.recipe_name,
            status = %root.status(),
            steps = summary.steps_run,
            failed = summary.steps_failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "engine_completed"
        );
        Ok(root)
    }

    /// Run one step and return its finished ACTION node.
    async fn run_step(
        &self,
        compiled: &CompiledRecipeContext,
        ctx: &StepContext,
        group: &StepGroup,
        step: &RecipeStep,
    ) -> Result<ResultNode, WrappedError> {
        let action = compiled.actions.get(&step.action).cloned().ok_or_else(|| {
            WrappedError::internal(
                "ActionNotCompiled",
                format!("no dispatch entry for action '{}'", step.action),
            )
        })?;

        let mut node = ResultNode::start(step.step_name.clone(), NodeKind::Action)
            .with_bubbling(true, true)
            .with_detail(serde_json::json!({
                "group": group.alias,
                "action": step.action,
                "options": step.options,
            }));

        tracing::info!(group = %group.alias, step = %step.step_name, action = %step.action, "step_started");
        let namespace = format!("action:{}", step.action);
        ctx.debug.debug_value(&namespace, "options", &step.options);

        match action.execute(ctx, &step.options, &mut node).await {
            // A bubbled process failure outranks the action's own report.
            Ok(_) if node.is_terminal() => {}
            Ok(res) => {
                ctx.debug.debug(&namespace, &res.result);
                let detail = serde_json::json!({
                    "group": group.alias,
                    "action": step.action,
                    "options": step.options,
                    "result": res,
                });
                if res.warnings.is_empty() {
                    node.succeed(Some(detail))?;
                } else {
                    node.warn(Some(detail))?;
                }
            }
            // Already terminal when a process child bubbled.
            Err(_) if node.is_terminal() => {}
            Err(mut err) => {
                err.add_provenance(node.provenance_line(&err.message));
                if err.is_unexpected() {
                    node.raise(err)?;
                } else {
                    node.fail(err)?;
                }
            }
        }
        Ok(node)
    }
}

fn skipped_node(name: &str, detail: serde_json::Value) -> Result<ResultNode, WrappedError> {
    let mut node = ResultNode::start(name, NodeKind::Action);
    node.warn(Some(detail))?;
    Ok(node)
}
