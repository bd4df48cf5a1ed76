//! Workflow execution runtime
//!
//! This crate provides the engine that loads, validates and runs workflows:
//! the executor registry, the template registry, dependency validation and
//! the worker-pool-bounded step driver.

mod context;
pub mod dag;
mod engine;
mod registry;
mod templates;

pub use context::{ExecutionError, ExecutionResult, StepRecord, StepState};
pub use engine::{EngineConfig, WorkflowEngine};
pub use registry::ExecutorRegistry;
pub use templates::TemplateRegistry;
