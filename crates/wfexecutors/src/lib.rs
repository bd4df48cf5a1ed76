//! Built-in step executors
//!
//! One executor per built-in step type. Each validates its payload and
//! returns a descriptive output map; real agent, expression and scripting
//! back-ends replace them by registering under the same type.

mod agent;
mod control;
mod transform;

pub use agent::AgentExecutor;
pub use control::{ConditionExecutor, LoopExecutor, ParallelExecutor};
pub use transform::TransformExecutor;

use std::sync::Arc;
use wfcore::{StepContext, StepError, StepExecutor};

/// All built-in executors, ready to register with an engine
pub fn builtin_executors() -> Vec<Arc<dyn StepExecutor>> {
    vec![
        Arc::new(AgentExecutor),
        Arc::new(ConditionExecutor),
        Arc::new(ParallelExecutor),
        Arc::new(LoopExecutor),
        Arc::new(TransformExecutor),
    ]
}

/// Fail fast when the step context is already cancelled or past its deadline
fn ensure_live(ctx: &StepContext) -> Result<(), StepError> {
    match ctx.run.err() {
        Some(_) => Err(StepError::Cancelled),
        None => Ok(()),
    }
}

#[cfg(test)]
fn test_context() -> StepContext {
    StepContext::new(uuid::Uuid::new_v4(), "test", wfcore::EventEmitter::detached("test"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_types_are_unique() {
        let types: HashSet<String> = builtin_executors()
            .iter()
            .map(|e| e.step_type().to_string())
            .collect();
        let expected: HashSet<String> = ["agent", "condition", "parallel", "loop", "transform"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(types, expected);
    }
}
