//! Test doubles shared by unit tests: a scripted platform CLI, a scripted
//! prompter, and a configurable stub action.

use crate::actions::{run_tool, Action, StepContext};
use crate::core::debug::{DebugContext, LogLevel};
use crate::core::error::WrappedError;
use crate::core::prompt::{Choice, Prompter};
use crate::core::result::ResultNode;
use crate::core::types::{RecipeActionResult, TargetOrg};
use crate::transport::{ExternalTool, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// ScriptedTool
// ============================================================================

#[derive(Debug, Clone)]
enum Reply {
    Output(ToolOutput),
    Transport(String),
}

/// Replays queued replies in order; an empty queue answers `status: 0`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTool {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    calls: Arc<Mutex<Vec<ToolInvocation>>>,
}

impl ScriptedTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_json(self, value: serde_json::Value) -> Self {
        let code = match value.get("status").and_then(|s| s.as_i64()) {
            Some(0) | None => 0,
            Some(_) => 1,
        };
        self.respond_raw(code, &value.to_string(), "")
    }

    pub fn respond_raw(self, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.push(Reply::Output(ToolOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }))
    }

    pub fn fail_transport(self, message: &str) -> Self {
        self.push(Reply::Transport(message.to_string()))
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalTool for ScriptedTool {
    fn binary(&self) -> &str {
        "sfdx"
    }

    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, WrappedError> {
        self.calls.lock().unwrap().push(invocation.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::Transport(msg)) => Err(WrappedError::transport("SpawnFailed", msg)),
            None => Ok(ToolOutput {
                exit_code: 0,
                stdout: r#"{"status":0,"result":{}}"#.to_string(),
                stderr: String::new(),
            }),
        }
    }
}

/// Step context against `demo-org`, rooted at `/recipes/demo`.
pub fn step_context(tool: ScriptedTool, with_devhub: bool) -> StepContext {
    StepContext {
        target: TargetOrg {
            org_name: "Demo".to_string(),
            alias: "demo-org".to_string(),
            description: String::new(),
            is_scratch_org: true,
            scratch_def_json: Some("config/scratch.json".to_string()),
        },
        devhub_alias: with_devhub.then(|| "my-hub".to_string()),
        log_level: LogLevel::Warn,
        recipe_dir: PathBuf::from("/recipes/demo"),
        debug: DebugContext::default(),
        tool: Arc::new(tool),
    }
}

// ============================================================================
// ScriptedPrompter
// ============================================================================

#[derive(Debug, Clone)]
pub enum Answer {
    Select(usize),
    MultiSelect(Vec<bool>),
    Confirm(bool),
}

/// Answers prompts from a queue and records every question asked.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
    answers: Arc<Mutex<VecDeque<Answer>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
            asked: Arc::default(),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn next(&self, message: &str) -> Result<Answer, WrappedError> {
        self.asked.lock().unwrap().push(message.to_string());
        self.answers.lock().unwrap().pop_front().ok_or_else(|| {
            WrappedError::internal("UnexpectedPrompt", format!("no scripted answer for: {}", message))
        })
    }

    fn mismatch(message: &str, got: &Answer) -> WrappedError {
        WrappedError::internal(
            "UnexpectedPrompt",
            format!("scripted answer {:?} does not fit: {}", got, message),
        )
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn select(&self, message: &str, _choices: &[Choice]) -> Result<usize, WrappedError> {
        match self.next(message)? {
            Answer::Select(i) => Ok(i),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    async fn multi_select(
        &self,
        message: &str,
        _choices: &[Choice],
        _defaults: &[bool],
    ) -> Result<Vec<bool>, WrappedError> {
        match self.next(message)? {
            Answer::MultiSelect(v) => Ok(v),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    async fn confirm(&self, message: &str, _default: bool) -> Result<bool, WrappedError> {
        match self.next(message)? {
            Answer::Confirm(b) => Ok(b),
            other => Err(Self::mismatch(message, &other)),
        }
    }
}

// ============================================================================
// StubAction
// ============================================================================

#[derive(Debug, Clone)]
pub enum StubOutcome {
    Succeed,
    Warn(String),
    Fail(WrappedError),
    /// Runs the tool, discards its error and reports success.
    IgnoreToolError,
}

/// Action with a fixed outcome that counts its runs.
#[derive(Debug, Clone)]
pub struct StubAction {
    alias: &'static str,
    outcome: StubOutcome,
    runs: Arc<AtomicUsize>,
}

impl StubAction {
    pub fn new(alias: &'static str, outcome: StubOutcome) -> Self {
        Self {
            alias,
            outcome,
            runs: Arc::default(),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for StubAction {
    fn alias(&self) -> &'static str {
        self.alias
    }

    fn description(&self) -> &'static str {
        "stub"
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        options: &serde_json::Value,
        node: &mut ResultNode,
    ) -> Result<RecipeActionResult, WrappedError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            StubOutcome::Succeed => Ok(RecipeActionResult::ok("done", options.clone())),
            StubOutcome::Warn(w) => Ok(RecipeActionResult::ok("done", options.clone()).with_warning(w.as_str())),
            StubOutcome::Fail(err) => Err(err.clone()),
            StubOutcome::IgnoreToolError => {
                let _ = run_tool(ctx, node, ToolInvocation::new("force:stub:run")).await;
                Ok(RecipeActionResult::ok("done", options.clone()))
            }
        }
    }
}

/// Two groups (`setup`, `data-load`) and two targets (scratch first).
pub fn sample_recipe() -> serde_json::Value {
    serde_json::json!({
        "schemaVersion": "1.0",
        "recipeName": "Demo Build",
        "recipeStepGroups": [
            {
                "stepGroupName": "Setup",
                "alias": "setup",
                "recipeSteps": [
                    {"stepName": "Deploy base", "action": "deploy-metadata", "options": {"mdapiSource": "mdapi/base"}}
                ]
            },
            {
                "stepGroupName": "Data load",
                "alias": "data-load",
                "recipeSteps": [
                    {"stepName": "Import accounts", "action": "import-data", "options": {"plan": "data/plan.json"}},
                    {"stepName": "Seed script", "action": "execute-apex", "options": {"apexCodeFile": "seed.apex"}}
                ]
            }
        ],
        "options": {
            "targetOrgs": [
                {"orgName": "Scratch", "alias": "demo-scratch", "isScratchOrg": true, "scratchDefJson": "config/scratch.json"},
                {"orgName": "Sandbox", "alias": "demo-sandbox", "isScratchOrg": false}
            ],
            "skipGroups": [],
            "skipActions": [],
            "haltOnError": true,
            "noCustomInstall": false
        }
    })
}
