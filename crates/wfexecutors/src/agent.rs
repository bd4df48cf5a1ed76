use async_trait::async_trait;
use wfcore::{step_types, Step, StepContext, StepError, StepExecutor, StepInputs, StepOutputs, Value};

/// Agent step: hands a prompt to an LLM provider.
///
/// Provider calls live outside the engine; this executor validates the
/// payload and reports what it would have sent.
pub struct AgentExecutor;

#[async_trait]
impl StepExecutor for AgentExecutor {
    fn step_type(&self) -> &str {
        step_types::AGENT
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        step: &Step,
        _inputs: &StepInputs,
    ) -> Result<StepOutputs, StepError> {
        crate::ensure_live(ctx)?;
        let agent = step
            .agent_config()
            .ok_or_else(|| StepError::MissingConfig(step_types::AGENT.to_string()))?;

        tracing::debug!(
            "Agent step {} using {}/{}",
            step.id,
            agent.provider,
            agent.model
        );
        ctx.events
            .info(format!("Agent {} ({})", agent.provider, agent.model));

        Ok(StepOutputs::from([
            ("agent".to_string(), Value::from(agent.provider.as_str())),
            ("model".to_string(), Value::from(agent.model.as_str())),
            ("status".to_string(), Value::from("completed")),
            ("prompt".to_string(), Value::from(agent.prompt.as_str())),
            ("executed".to_string(), Value::Bool(true)),
        ]))
    }
}
