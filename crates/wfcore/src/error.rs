use crate::context::CancelReason;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Step {step_id} failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: StepError,
    },

    #[error("Execution cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    pub fn step_failed(step_id: impl Into<String>, source: StepError) -> Self {
        FlowError::StepFailed {
            step_id: step_id.into(),
            source,
        }
    }

    /// True when the run was aborted by cancellation or its deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Cancelled(_))
    }

    /// The workflow-level error, if this is one.
    pub fn as_workflow_error(&self) -> Option<&WorkflowError> {
        match self {
            FlowError::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised by a step executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Missing {0} config")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Failed to parse workflow: {0}")]
    Parse(String),

    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Cyclic dependency detected at step: {0}")]
    CyclicDependency(String),

    #[error("Dependency not met for step {step}: {dependency}")]
    DependencyNotMet { step: String, dependency: String },

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),
}
