//! DF-017: CLI subcommands: run, plan, validate, schema, completions.

use crate::actions::ActionRegistry;
use crate::config::{self, EngineConfig};
use crate::core::compiler::RecipeCompiler;
use crate::core::debug::{self, DebugContext, LogLevel};
use crate::core::error::WrappedError;
use crate::core::executor::RecipeExecutor;
use crate::core::prompt::{NoPrompter, Prompter, TerminalPrompter};
use crate::core::recipe;
use crate::core::render::{DebugFlags, RenderOptions};
use crate::core::result::{NodeKind, NodeStatus, ResultNode};
use crate::core::types::{CompileOptions, ExecutionPlan};
use crate::transport::local::ProcessTool;
use crate::transport::ExternalTool;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "demoforge",
    version,
    about = "Recipe-driven provisioning of demo and package environments"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a demo environment from a recipe
    Run(RunArgs),

    /// Compile a recipe and show what would run
    Plan {
        #[command(flatten)]
        compile: CompileArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a recipe document's shape without compiling it
    Validate {
        /// Path to the recipe (JSON or YAML)
        #[arg(short, long)]
        recipe: PathBuf,
    },

    /// Print the recipe JSON Schema
    Schema,

    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

/// Flags shared by every command that compiles a recipe.
#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Path to the recipe (JSON or YAML)
    #[arg(short, long)]
    pub recipe: PathBuf,

    /// Alias of the target org (must be declared by the recipe)
    #[arg(short = 'u', long)]
    pub target_org: Option<String>,

    /// Step-group aliases to skip; given alone, skips nothing without prompting
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    pub skip_group: Option<Vec<String>>,

    /// Action aliases to skip
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    pub skip_action: Option<Vec<String>>,

    /// Stop at the first failed step
    #[arg(long, conflicts_with = "continue_on_error")]
    pub halt_on_error: bool,

    /// Keep going after a failed step
    #[arg(long)]
    pub continue_on_error: bool,

    /// Dev hub alias used to create and delete scratch orgs
    #[arg(short = 'v', long)]
    pub devhub: Option<String>,

    /// Log level for the engine and the platform CLI
    #[arg(long)]
    pub loglevel: Option<LogLevel>,

    /// Do not delete and recreate a scratch org target
    #[arg(long)]
    pub skip_refresh: bool,

    /// Fail instead of prompting for missing input
    #[arg(long)]
    pub no_prompt: bool,

    /// Engine config file (default: ./demoforge.yaml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Debug namespaces to enable (e.g. compiler, action:*)
    #[arg(long = "debug-ns", value_delimiter = ',')]
    pub debug_ns: Vec<String>,
}

impl CompileArgs {
    pub fn compile_options(&self) -> CompileOptions {
        let halt_on_error = if self.halt_on_error {
            Some(true)
        } else if self.continue_on_error {
            Some(false)
        } else {
            None
        };
        CompileOptions {
            target_org_alias: self.target_org.clone(),
            skip_groups: self.skip_group.clone(),
            skip_actions: self.skip_action.clone(),
            halt_on_error,
            devhub_alias: self.devhub.clone(),
            log_level: self.loglevel,
            skip_target_refresh: self.skip_refresh,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub compile: CompileArgs,

    /// Show extended detail for every node
    #[arg(long)]
    pub debug: bool,

    /// Show extended detail when the run fails
    #[arg(long)]
    pub debug_error: bool,

    /// Show extended detail when the run succeeds
    #[arg(long)]
    pub debug_success: bool,

    /// Inspection depth for extended detail
    #[arg(long, default_value_t = 2)]
    pub debug_depth: usize,

    /// Print the result tree as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn debug_flags(&self) -> DebugFlags {
        DebugFlags {
            debug: self.debug,
            debug_error: self.debug_error,
            debug_success: self.debug_success,
            depth: self.debug_depth,
        }
    }
}

/// Collaborators for one invocation.
pub struct Session {
    pub tool: Arc<dyn ExternalTool>,
    pub prompter: Arc<dyn Prompter>,
    pub registry: ActionRegistry,
    pub default_devhub: Option<String>,
    pub debug: DebugContext,
}

impl Session {
    /// Build the production session from config and flags; installs tracing.
    fn from_args(args: &CompileArgs) -> Result<Self, String> {
        let cwd = std::env::current_dir().map_err(|e| format!("cannot read cwd: {}", e))?;
        let cfg: EngineConfig = config::load_config(args.config.as_deref(), &cwd)?;

        let level = args.loglevel.unwrap_or(cfg.log_level);
        let mut namespaces = cfg.debug_namespaces.clone();
        namespaces.extend(args.debug_ns.iter().cloned());
        debug::init_tracing(level, !namespaces.is_empty());

        let prompter: Arc<dyn Prompter> = if args.no_prompt {
            Arc::new(NoPrompter)
        } else {
            Arc::new(TerminalPrompter::new())
        };
        Ok(Self {
            tool: Arc::new(ProcessTool::new(
                cfg.tool_binary.clone(),
                cfg.command_timeout(),
            )),
            prompter,
            registry: ActionRegistry::standard(),
            default_devhub: cfg.default_devhub_alias.clone(),
            debug: DebugContext::new(namespaces, level),
        })
    }

    fn compiler(&self) -> RecipeCompiler {
        RecipeCompiler::new(self.registry.clone(), self.prompter.clone())
            .with_default_devhub(self.default_devhub.clone())
    }
}

/// Dispatch a CLI command. Returns the process exit code.
pub async fn dispatch(cmd: Commands) -> Result<i32, String> {
    match cmd {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Plan { compile, json } => cmd_plan(&compile, json).await,
        Commands::Validate { recipe } => cmd_validate(&recipe),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "demoforge", &mut std::io::stdout());
            Ok(0)
        }
    }
}

async fn cmd_run(args: &RunArgs) -> Result<i32, String> {
    let session = Session::from_args(&args.compile)?;
    let command = run_recipe(&session, &args.compile.recipe, &args.compile.compile_options())
        .await
        .map_err(|e| e.to_string())?;

    if args.json {
        let out = serde_json::to_string_pretty(&command)
            .map_err(|e| format!("cannot serialize result tree: {}", e))?;
        println!("{}", out);
    } else {
        let opts = RenderOptions::for_status(&args.debug_flags(), command.status());
        print!("{}", command.render(&opts));
    }

    if let Some(err) = command.error() {
        eprintln!("error: {}", err.root_cause());
    }
    Ok(command.exit_code())
}

/// Load, compile, and execute one recipe under a COMMAND root.
///
/// Command (no bubbling) → Recipe (bubbles) → Engine root. `Err` is
/// reserved for internal node violations; run failures live in the tree.
pub async fn run_recipe(
    session: &Session,
    recipe_path: &Path,
    opts: &CompileOptions,
) -> Result<ResultNode, WrappedError> {
    let mut command = ResultNode::start(
        format!("run {}", recipe_path.display()),
        NodeKind::Command,
    );
    let mut recipe =
        ResultNode::start(recipe_path.display().to_string(), NodeKind::Recipe).with_bubbling(true, true);

    match compile_and_execute(session, recipe_path, opts, &mut recipe).await {
        Ok(()) => recipe.succeed(None)?,
        // The engine root bubbled through the recipe node.
        Err(_) if recipe.is_terminal() => {}
        Err(mut err) => {
            err.add_provenance(recipe.provenance_line(&err.message));
            if err.is_unexpected() {
                recipe.raise(err)?;
            } else {
                recipe.fail(err)?;
            }
        }
    }

    let recipe_status = recipe.status();
    let recipe_error = recipe.error().cloned();
    command.add_child(recipe)?;

    match recipe_error {
        Some(mut err) => {
            err.add_provenance(command.provenance_line(&err.message));
            if recipe_status == NodeStatus::Error {
                command.raise(err)?;
            } else {
                command.fail(err)?;
            }
        }
        None => command.succeed(None)?,
    }
    Ok(command)
}

async fn compile_and_execute(
    session: &Session,
    recipe_path: &Path,
    opts: &CompileOptions,
    recipe: &mut ResultNode,
) -> Result<(), WrappedError> {
    let raw = recipe::load_recipe(recipe_path)?;
    let compiled = session
        .compiler()
        .compile(&raw, opts, recipe_dir(recipe_path), session.debug.clone())
        .await?;
    recipe.set_detail(serde_json::json!({
        "recipeName": compiled.recipe_name(),
        "target": compiled.target().alias,
        "fingerprint": compiled.fingerprint()?,
    }))?;

    let engine = RecipeExecutor::new(session.tool.clone())
        .execute(compiled)
        .await?;
    recipe.add_child(engine)
}

/// Directory that relative recipe paths resolve against.
fn recipe_dir(recipe_path: &Path) -> PathBuf {
    match recipe_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn cmd_plan(args: &CompileArgs, json: bool) -> Result<i32, String> {
    let session = Session::from_args(args)?;
    let raw = recipe::load_recipe(&args.recipe).map_err(|e| e.to_string())?;
    let compiled = session
        .compiler()
        .compile(
            &raw,
            &args.compile_options(),
            recipe_dir(&args.recipe),
            session.debug.clone(),
        )
        .await
        .map_err(|e| e.to_string())?;
    let fingerprint = compiled.fingerprint().map_err(|e| e.to_string())?;
    let plan = compiled.plan();

    if json {
        let out = serde_json::json!({ "fingerprint": fingerprint, "plan": plan });
        let text = serde_json::to_string_pretty(&out)
            .map_err(|e| format!("cannot serialize plan: {}", e))?;
        println!("{}", text);
    } else {
        print!("{}", format_plan(&plan, &fingerprint));
    }
    Ok(0)
}

/// Human-readable plan listing.
fn format_plan(plan: &ExecutionPlan, fingerprint: &str) -> String {
    let mut out = String::new();
    let kind = if plan.target_is_scratch_org {
        "scratch org"
    } else {
        "org"
    };
    out.push_str(&format!(
        "Planning: {} -> {} ({})\n",
        plan.recipe_name, plan.target_alias, kind
    ));
    out.push_str(&format!("  fingerprint: {}\n", fingerprint));
    if let Some(hub) = &plan.devhub_alias {
        out.push_str(&format!("  dev hub: {}\n", hub));
    }
    out.push('\n');

    let mut skipped = 0;
    for group in &plan.groups {
        let mut header = format!("{} ({})", group.alias, group.name);
        if group.synthetic {
            header.push_str(" [generated]");
        }
        if group.skipped {
            header.push_str(" SKIPPED");
        }
        out.push_str(&format!("{}:\n", header));
        for step in &group.steps {
            let off = group.skipped || step.skipped;
            if off {
                skipped += 1;
            }
            let symbol = if off { "-" } else { "+" };
            out.push_str(&format!("  {} {} [{}]\n", symbol, step.name, step.action));
        }
    }

    out.push('\n');
    out.push_str(&format!(
        "Plan: {} step(s) to run, {} skipped, halt on error: {}.\n",
        plan.runnable_steps(),
        skipped,
        if plan.halt_on_error { "yes" } else { "no" }
    ));
    out
}

fn cmd_validate(file: &Path) -> Result<i32, String> {
    let raw = recipe::load_recipe(file).map_err(|e| e.to_string())?;
    let doc = recipe::validate_document(&raw).map_err(|e| {
        eprintln!("  ERROR: {}", e.message);
        "validation failed".to_string()
    })?;

    let steps: usize = doc.recipe_step_groups.iter().map(|g| g.recipe_steps.len()).sum();
    println!(
        "OK: {} ({} step groups, {} steps, {} target orgs)",
        doc.display_name(),
        doc.recipe_step_groups.len(),
        steps,
        doc.options.target_orgs.len()
    );

    let registry = ActionRegistry::standard();
    for group in &doc.recipe_step_groups {
        for step in &group.recipe_steps {
            if registry.get(&step.action).is_none() {
                println!(
                    "  note: step '{}' uses action '{}', which this build does not provide",
                    step.step_name, step.action
                );
            }
        }
    }
    Ok(0)
}

fn cmd_schema() -> Result<i32, String> {
    let schema = recipe::recipe_schema().map_err(|e| e.to_string())?;
    println!("{}", schema);
    Ok(0)
}
