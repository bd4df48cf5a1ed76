use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use wfcore::{ExecutionId, FlowError, StepInputs, StepOutputs, Value, Workflow, WorkflowError};

/// Lifecycle of one step within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Failed, but `on_failure` let the run continue
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step_id: String,
    pub state: StepState,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Mutable state of a single workflow run.
///
/// Owned by the task driving the run; nothing here is shared between runs.
pub(crate) struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub workflow: Arc<Workflow>,
    pub inputs: HashMap<String, Value>,
    pub outputs: HashMap<String, Value>,
    pub step_cache: HashMap<String, StepOutputs>,
    pub env: Arc<HashMap<String, String>>,
    started: DateTime<Utc>,
    clock: Instant,
    records: Vec<StepRecord>,
}

impl ExecutionContext {
    pub fn new(workflow: Arc<Workflow>, inputs: HashMap<String, Value>) -> Self {
        let env = Arc::new(workflow.env.clone());
        let records = workflow
            .steps
            .iter()
            .map(|step| StepRecord {
                step_id: step.id.clone(),
                state: StepState::Pending,
                attempts: 0,
                error: None,
            })
            .collect();

        Self {
            execution_id: ExecutionId::new_v4(),
            workflow,
            inputs,
            outputs: HashMap::new(),
            step_cache: HashMap::new(),
            env,
            started: Utc::now(),
            clock: Instant::now(),
            records,
        }
    }

    /// Every `depends_on` id must already have cached outputs.
    pub fn check_dependencies(&self, step_id: &str, depends_on: &[String]) -> Result<(), WorkflowError> {
        match depends_on
            .iter()
            .find(|dep| !self.step_cache.contains_key(dep.as_str()))
        {
            Some(dep) => Err(WorkflowError::DependencyNotMet {
                step: step_id.to_string(),
                dependency: dep.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Run inputs plus each dependency's outputs under `"<dep>.<key>"`.
    pub fn step_inputs(&self, depends_on: &[String]) -> StepInputs {
        let mut inputs = self.inputs.clone();
        for dep in depends_on {
            if let Some(outputs) = self.step_cache.get(dep) {
                for (key, value) in outputs {
                    inputs.insert(format!("{}.{}", dep, key), value.clone());
                }
            }
        }
        inputs
    }

    pub fn mark_running(&mut self, step_id: &str) {
        if let Some(record) = self.record_mut(step_id) {
            record.state = StepState::Running;
        }
    }

    pub fn record_success(&mut self, step_id: &str, attempts: u32, outputs: StepOutputs) {
        if let Some(record) = self.record_mut(step_id) {
            record.state = StepState::Succeeded;
            record.attempts = attempts;
        }
        self.outputs
            .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.step_cache.insert(step_id.to_string(), outputs);
    }

    pub fn record_failure(&mut self, step_id: &str, attempts: u32, error: &FlowError) {
        self.finish_with_error(step_id, StepState::Failed, attempts, error);
    }

    pub fn mark_skipped(&mut self, step_id: &str, attempts: u32, error: &FlowError) {
        self.finish_with_error(step_id, StepState::Skipped, attempts, error);
    }

    fn finish_with_error(&mut self, step_id: &str, state: StepState, attempts: u32, error: &FlowError) {
        if let Some(record) = self.record_mut(step_id) {
            record.state = state;
            record.attempts = attempts;
            record.error = Some(error.to_string());
        }
    }

    fn record_mut(&mut self, step_id: &str) -> Option<&mut StepRecord> {
        self.records.iter_mut().find(|r| r.step_id == step_id)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    pub fn into_result(self) -> ExecutionResult {
        let duration_ms = self.elapsed_ms();
        ExecutionResult {
            execution_id: self.execution_id,
            workflow: self.workflow.name.clone(),
            outputs: self.outputs,
            step_outputs: self.step_cache,
            steps: self.records,
            started: self.started,
            duration_ms,
        }
    }
}

/// Outcome of a workflow run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub workflow: String,
    /// Flat merge of every successful step's outputs; later steps win on
    /// key collisions.
    pub outputs: HashMap<String, Value>,
    /// Outputs per successful step id
    pub step_outputs: HashMap<String, StepOutputs>,
    /// One record per declared step, in declaration order
    pub steps: Vec<StepRecord>,
    pub started: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Result of a run that never started a step
    pub fn empty(workflow: impl Into<String>) -> Self {
        Self {
            execution_id: ExecutionId::nil(),
            workflow: workflow.into(),
            outputs: HashMap::new(),
            step_outputs: HashMap::new(),
            steps: Vec::new(),
            started: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step_id == step_id)
    }
}

/// A failed run together with whatever it produced before failing
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionError {
    #[source]
    pub error: FlowError,
    pub partial: ExecutionResult,
}

impl ExecutionError {
    pub fn new(error: FlowError, partial: ExecutionResult) -> Self {
        Self { error, partial }
    }

    pub fn error(&self) -> &FlowError {
        &self.error
    }

    pub fn partial(&self) -> &ExecutionResult {
        &self.partial
    }

    pub fn into_parts(self) -> (FlowError, ExecutionResult) {
        (self.error, self.partial)
    }
}
