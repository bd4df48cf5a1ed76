use async_trait::async_trait;
use wfcore::{step_types, Step, StepContext, StepError, StepExecutor, StepInputs, StepOutputs, Value};

/// Transform step: maps an input reference to an output reference
pub struct TransformExecutor;

#[async_trait]
impl StepExecutor for TransformExecutor {
    fn step_type(&self) -> &str {
        step_types::TRANSFORM
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        step: &Step,
        inputs: &StepInputs,
    ) -> Result<StepOutputs, StepError> {
        crate::ensure_live(ctx)?;
        let transform = step
            .transform_config()
            .ok_or_else(|| StepError::MissingConfig(step_types::TRANSFORM.to_string()))?;

        if !transform.input.is_empty() && !inputs.contains_key(&transform.input) {
            ctx.events
                .warn(format!("Input reference '{}' is not bound", transform.input));
        }

        Ok(StepOutputs::from([
            ("input".to_string(), Value::from(transform.input.as_str())),
            ("output".to_string(), Value::from(transform.output.as_str())),
            ("executed".to_string(), Value::Bool(true)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_context;
    use wfcore::TransformConfig;

    #[tokio::test]
    async fn echoes_references() {
        let step = Step::transform(
            "shape",
            TransformConfig {
                input: "fetch.result".to_string(),
                output: "summary".to_string(),
                script: "upper".to_string(),
            },
        );
        let inputs = StepInputs::from([("fetch.result".to_string(), Value::from("ok"))]);

        let outputs = TransformExecutor
            .execute(&test_context(), &step, &inputs)
            .await
            .unwrap();

        assert_eq!(outputs["input"].as_str(), Some("fetch.result"));
        assert_eq!(outputs["output"].as_str(), Some("summary"));
        assert_eq!(outputs["executed"], Value::Bool(true));
    }

    #[tokio::test]
    async fn requires_transform_payload() {
        let err = TransformExecutor
            .execute(
                &test_context(),
                &Step::new("shape", step_types::TRANSFORM),
                &StepInputs::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, StepError::MissingConfig("transform".to_string()));
    }
}
