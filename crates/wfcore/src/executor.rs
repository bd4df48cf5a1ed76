use crate::{EventEmitter, ExecutionId, RunContext, Step, StepError, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub type StepInputs = HashMap<String, Value>;
pub type StepOutputs = HashMap<String, Value>;

/// Core trait that every step type implements.
///
/// The engine dispatches on `step_type()`; registering a second executor with
/// the same type replaces the first.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Dispatch key (e.g. "agent", "transform")
    fn step_type(&self) -> &str;

    /// Run one step. Implementations should return promptly once
    /// `ctx.run` is done, and fail with `StepError::MissingConfig` when the
    /// step lacks the payload they need.
    async fn execute(
        &self,
        ctx: &StepContext,
        step: &Step,
        inputs: &StepInputs,
    ) -> Result<StepOutputs, StepError>;
}

/// Execution context passed to each executor invocation
#[derive(Clone)]
pub struct StepContext {
    pub execution_id: ExecutionId,
    pub workflow: String,
    pub step_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Workflow `env`, passed through untouched
    pub env: Arc<HashMap<String, String>>,
    pub debug: bool,
    /// Cancellation and deadline for this attempt
    pub run: RunContext,
    pub events: EventEmitter,
}

impl StepContext {
    pub fn new(execution_id: ExecutionId, workflow: impl Into<String>, events: EventEmitter) -> Self {
        Self {
            execution_id,
            workflow: workflow.into(),
            step_id: String::new(),
            attempt: 1,
            env: Arc::new(HashMap::new()),
            debug: false,
            run: RunContext::new(),
            events,
        }
    }

    pub fn for_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = step_id.into();
        self
    }

    pub fn with_run(mut self, run: RunContext) -> Self {
        self.run = run;
        self
    }

    pub fn with_env(mut self, env: Arc<HashMap<String, String>>) -> Self {
        self.env = env;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Look up a workflow environment value
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
}
