//! Control-flow steps: condition, parallel and loop.
//!
//! Expression evaluation and sub-step fan-out belong to the executors that
//! replace these; the built-ins validate the payload and describe it.

use async_trait::async_trait;
use wfcore::{step_types, Step, StepContext, StepError, StepExecutor, StepInputs, StepOutputs, Value};

pub struct ConditionExecutor;

#[async_trait]
impl StepExecutor for ConditionExecutor {
    fn step_type(&self) -> &str {
        step_types::CONDITION
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        step: &Step,
        _inputs: &StepInputs,
    ) -> Result<StepOutputs, StepError> {
        crate::ensure_live(ctx)?;
        let condition = step
            .condition_config()
            .ok_or_else(|| StepError::MissingConfig(step_types::CONDITION.to_string()))?;

        tracing::debug!("Condition step {}: {}", step.id, condition.expression);

        Ok(StepOutputs::from([
            ("condition".to_string(), Value::from(condition.expression.as_str())),
            ("evaluated".to_string(), Value::Bool(true)),
        ]))
    }
}

pub struct ParallelExecutor;

#[async_trait]
impl StepExecutor for ParallelExecutor {
    fn step_type(&self) -> &str {
        step_types::PARALLEL
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        step: &Step,
        _inputs: &StepInputs,
    ) -> Result<StepOutputs, StepError> {
        crate::ensure_live(ctx)?;
        let parallel = step
            .parallel_config()
            .ok_or_else(|| StepError::MissingConfig(step_types::PARALLEL.to_string()))?;

        ctx.events
            .info(format!("Parallel branches: {}", parallel.steps.join(", ")));

        Ok(StepOutputs::from([
            ("parallel_steps".to_string(), Value::from(parallel.steps.clone())),
            ("executed".to_string(), Value::Bool(true)),
        ]))
    }
}

pub struct LoopExecutor;

#[async_trait]
impl StepExecutor for LoopExecutor {
    fn step_type(&self) -> &str {
        step_types::LOOP
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        step: &Step,
        _inputs: &StepInputs,
    ) -> Result<StepOutputs, StepError> {
        crate::ensure_live(ctx)?;
        let looping = step
            .loop_config()
            .ok_or_else(|| StepError::MissingConfig(step_types::LOOP.to_string()))?;

        tracing::debug!(
            "Loop step {} over '{}' (max {})",
            step.id,
            looping.over,
            looping.max_iterations
        );

        Ok(StepOutputs::from([
            ("iterations".to_string(), Value::from(looping.max_iterations)),
            ("executed".to_string(), Value::Bool(true)),
        ]))
    }
}
