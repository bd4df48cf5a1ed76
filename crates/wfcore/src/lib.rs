//! Core abstractions for the workflow engine
//!
//! This crate provides the workflow data model, the step executor trait and
//! the cancellation/event plumbing every other crate builds on.

mod context;
pub mod duration;
mod error;
mod events;
mod executor;
mod value;
mod workflow;

pub use context::{CancelReason, RunContext};
pub use error::{FlowError, StepError, WorkflowError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, ExecutionId, StepEvent};
pub use executor::{StepContext, StepExecutor, StepInputs, StepOutputs};
pub use value::Value;
pub use workflow::{
    step_types, AgentConfig, Backoff, ConditionConfig, Field, LoopConfig, ParallelConfig,
    RetryConfig, Step, StepConfig, TransformConfig, Trigger, Workflow, WorkflowOptions,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
