use crate::context::{ExecutionContext, ExecutionError, ExecutionResult};
use crate::dag;
use crate::registry::ExecutorRegistry;
use crate::templates::TemplateRegistry;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock, Semaphore};
use wfcore::{
    CancelReason, EventBus, ExecutionEvent, FlowError, RunContext, Step, StepContext, StepError,
    StepExecutor, StepInputs, StepOutputs, Value, Workflow, WorkflowError,
};

/// Configuration for the engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps allowed to run at once, across every run of this engine
    pub max_workers: usize,
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            event_buffer_size: 1000,
        }
    }
}

struct EngineState {
    workflows: HashMap<String, Arc<Workflow>>,
    executors: ExecutorRegistry,
}

/// Main engine for loading and executing workflows
pub struct WorkflowEngine {
    state: RwLock<EngineState>,
    templates: Arc<TemplateRegistry>,
    worker_pool: Semaphore,
    max_workers: usize,
    event_bus: Arc<EventBus>,
}

impl WorkflowEngine {
    /// Engine with the built-in executors and `max_workers` worker slots
    pub fn new(templates: Arc<TemplateRegistry>, max_workers: usize) -> Self {
        Self::with_config(
            templates,
            EngineConfig {
                max_workers,
                ..EngineConfig::default()
            },
        )
    }

    pub fn with_config(templates: Arc<TemplateRegistry>, config: EngineConfig) -> Self {
        Self::build(templates, config, ExecutorRegistry::with_builtins())
    }

    /// Engine with no executors registered
    pub fn bare(templates: Arc<TemplateRegistry>, config: EngineConfig) -> Self {
        Self::build(templates, config, ExecutorRegistry::new())
    }

    fn build(templates: Arc<TemplateRegistry>, config: EngineConfig, executors: ExecutorRegistry) -> Self {
        let max_workers = if config.max_workers == 0 {
            tracing::warn!("max_workers must be at least 1, using 1");
            1
        } else {
            config.max_workers
        };

        Self {
            state: RwLock::new(EngineState {
                workflows: HashMap::new(),
                executors,
            }),
            templates,
            worker_pool: Semaphore::new(max_workers),
            max_workers,
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
        }
    }

    /// Install an executor, replacing any registered for the same step type
    pub async fn register_executor(&self, executor: Arc<dyn StepExecutor>) {
        self.state.write().await.executors.register(executor);
    }

    /// Registered step types, sorted
    pub async fn list_step_types(&self) -> Vec<String> {
        self.state.read().await.executors.list_step_types()
    }

    /// Parse a YAML (or JSON) definition and register it under its name.
    pub async fn load_workflow(&self, raw: &str) -> Result<Arc<Workflow>, FlowError> {
        let workflow = Workflow::from_yaml(raw)?;
        self.register_workflow(workflow).await
    }

    /// Validate and register a workflow, replacing any with the same name
    pub async fn register_workflow(&self, workflow: Workflow) -> Result<Arc<Workflow>, FlowError> {
        dag::validate_workflow(&workflow)?;
        let workflow = Arc::new(workflow);
        self.insert_workflow(workflow.clone()).await;
        Ok(workflow)
    }

    /// Register every template of the engine's template registry.
    ///
    /// Templates are validated when they are loaded from disk, but ones added
    /// programmatically are checked here; an invalid one stops the import.
    pub async fn import_templates(&self) -> Result<usize, FlowError> {
        let mut imported = 0;
        for template in self.templates.templates() {
            dag::validate_workflow(template)?;
            self.insert_workflow(template.clone()).await;
            imported += 1;
        }
        Ok(imported)
    }

    async fn insert_workflow(&self, workflow: Arc<Workflow>) {
        tracing::info!("Registering workflow: {}", workflow.name);
        self.state
            .write()
            .await
            .workflows
            .insert(workflow.name.clone(), workflow);
    }

    pub async fn get_workflow(&self, name: &str) -> Option<Arc<Workflow>> {
        self.state.read().await.workflows.get(name).cloned()
    }

    /// Registered workflow names, sorted
    pub async fn list_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.workflows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Worker slots not currently held by a running step
    pub fn available_workers(&self) -> usize {
        self.worker_pool.available_permits()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    /// Run a registered workflow to completion.
    ///
    /// Steps run one after another in declaration order, each holding one
    /// worker slot. On failure the error carries the outputs produced so far.
    pub async fn execute_workflow(
        &self,
        ctx: &RunContext,
        name: &str,
        inputs: HashMap<String, Value>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let workflow = self.get_workflow(name).await.ok_or_else(|| {
            ExecutionError::new(
                WorkflowError::NotFound(name.to_string()).into(),
                ExecutionResult::empty(name),
            )
        })?;

        let inputs = workflow.merge_inputs(inputs);
        let missing = workflow.missing_required_inputs(&inputs);
        if !missing.is_empty() {
            tracing::warn!(
                "Workflow {} started without required inputs: {}",
                workflow.name,
                missing.join(", ")
            );
        }

        let run = ctx.child_with_timeout(workflow.options.timeout);
        let mut exec = ExecutionContext::new(workflow.clone(), inputs);

        tracing::info!(
            "Starting workflow execution: {} ({})",
            workflow.name,
            exec.execution_id
        );
        self.event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id: exec.execution_id,
            workflow: workflow.name.clone(),
            timestamp: Utc::now(),
        });

        let outcome = self.run_steps(&run, &mut exec).await;
        let duration_ms = exec.elapsed_ms();

        self.event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id: exec.execution_id,
            success: outcome.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let result = exec.into_result();
        match outcome {
            Ok(()) => {
                tracing::info!("Workflow {} completed in {}ms", workflow.name, duration_ms);
                Ok(result)
            }
            Err(error) => {
                tracing::error!("Workflow {} failed: {}", workflow.name, error);
                Err(ExecutionError::new(error, result))
            }
        }
    }

    async fn run_steps(&self, run: &RunContext, exec: &mut ExecutionContext) -> Result<(), FlowError> {
        let workflow = exec.workflow.clone();
        for step in &workflow.steps {
            self.execute_step(run, exec, step).await?;
        }
        Ok(())
    }

    /// Run one step inside a worker slot and record its outcome.
    ///
    /// `Err` aborts the run; failures absorbed by `on_failure` return `Ok`.
    async fn execute_step(
        &self,
        run: &RunContext,
        exec: &mut ExecutionContext,
        step: &Step,
    ) -> Result<(), FlowError> {
        let _permit = tokio::select! {
            biased;
            reason = run.done() => return Err(FlowError::Cancelled(reason)),
            permit = self.worker_pool.acquire() => {
                permit.map_err(|_| FlowError::Cancelled(CancelReason::Cancelled))?
            }
        };

        exec.mark_running(&step.id);
        let started = Instant::now();
        let mut attempts = 0;
        let outcome = self.dispatch(run, exec, step, &mut attempts).await;

        match outcome {
            Ok(outputs) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!("Step {} completed in {}ms", step.id, duration_ms);
                self.event_bus.emit(ExecutionEvent::StepCompleted {
                    execution_id: exec.execution_id,
                    step_id: step.id.clone(),
                    outputs: outputs.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                exec.record_success(&step.id, attempts, outputs);
                Ok(())
            }
            Err(error) => {
                let continued = !error.is_cancellation() && step.continues_on_failure();
                self.event_bus.emit(ExecutionEvent::StepFailed {
                    execution_id: exec.execution_id,
                    step_id: step.id.clone(),
                    error: error.to_string(),
                    continued,
                    timestamp: Utc::now(),
                });

                if continued {
                    tracing::warn!(
                        "Step {} failed: {}, handling with: {}",
                        step.id,
                        error,
                        step.on_failure.as_deref().unwrap_or_default()
                    );
                    exec.mark_skipped(&step.id, attempts, &error);
                    Ok(())
                } else {
                    tracing::error!("Step {} failed: {}", step.id, error);
                    exec.record_failure(&step.id, attempts, &error);
                    Err(error)
                }
            }
        }
    }

    /// Resolve, then invoke the executor until it succeeds or retries run out.
    async fn dispatch(
        &self,
        run: &RunContext,
        exec: &ExecutionContext,
        step: &Step,
        attempts: &mut u32,
    ) -> Result<StepOutputs, FlowError> {
        exec.check_dependencies(&step.id, &step.depends_on)?;

        let executor = self
            .state
            .read()
            .await
            .executors
            .get(&step.step_type)
            .ok_or_else(|| WorkflowError::UnknownStepType(step.step_type.clone()))?;

        let inputs = exec.step_inputs(&step.depends_on);
        let debug = exec.workflow.options.debug;
        if debug {
            tracing::debug!("Step {} inputs: {:?}", step.id, inputs);
        }

        self.event_bus.emit(ExecutionEvent::StepStarted {
            execution_id: exec.execution_id,
            step_id: step.id.clone(),
            step_type: step.step_type.clone(),
            timestamp: Utc::now(),
        });

        let max_attempts = step.retry.attempts();
        let mut attempt = 1;
        loop {
            *attempts = attempt;
            let step_run = run.child_with_timeout(step.timeout);
            let ctx = StepContext::new(
                exec.execution_id,
                exec.workflow.name.clone(),
                self.event_bus.create_emitter(exec.execution_id, &step.id),
            )
            .for_step(step.id.clone())
            .with_run(step_run.clone())
            .with_env(exec.env.clone())
            .with_attempt(attempt)
            .with_debug(debug);

            let error = match attempt_step(executor.as_ref(), &ctx, step, &inputs).await {
                Ok(outputs) => return Ok(outputs),
                Err(error) => error,
            };

            // A finished run is never retried
            if let Some(reason) = run.err() {
                return Err(FlowError::Cancelled(reason));
            }
            let error = match step_run.err() {
                Some(CancelReason::DeadlineExceeded) => StepError::Timeout {
                    millis: step.timeout.map_or(0, |t| t.as_millis() as u64),
                },
                _ => error,
            };

            if attempt >= max_attempts {
                return Err(FlowError::step_failed(step.id.clone(), error));
            }

            let delay = step.retry.delay_after(attempt);
            tracing::warn!(
                "Step {} attempt {}/{} failed: {}, retrying in {:?}",
                step.id,
                attempt,
                max_attempts,
                error,
                delay
            );
            self.event_bus.emit(ExecutionEvent::StepRetrying {
                execution_id: exec.execution_id,
                step_id: step.id.clone(),
                attempt,
                error: error.to_string(),
                timestamp: Utc::now(),
            });

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    reason = run.done() => return Err(FlowError::Cancelled(reason)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            attempt += 1;
        }
    }
}

/// One executor call, abandoned as soon as the step context is done.
async fn attempt_step(
    executor: &dyn StepExecutor,
    ctx: &StepContext,
    step: &Step,
    inputs: &StepInputs,
) -> Result<StepOutputs, StepError> {
    tokio::select! {
        result = executor.execute(ctx, step, inputs) => result,
        _ = ctx.run.done() => Err(StepError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(max_workers: usize) -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(TemplateRegistry::default()), max_workers)
    }

    #[tokio::test]
    async fn zero_workers_is_clamped() {
        let engine = engine(0);
        assert_eq!(engine.max_workers(), 1);
        assert_eq!(engine.available_workers(), 1);
    }

    #[tokio::test]
    async fn new_engine_has_builtin_executors() {
        let engine = engine(2);
        assert_eq!(
            engine.list_step_types().await,
            vec!["agent", "condition", "loop", "parallel", "transform"]
        );

        let bare = WorkflowEngine::bare(Arc::new(TemplateRegistry::default()), EngineConfig::default());
        assert!(bare.list_step_types().await.is_empty());
        assert_eq!(bare.max_workers(), 10);
    }

    #[test]
    fn config_fills_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_workers": 4}"#).unwrap();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.event_buffer_size, 1000);
    }

    #[tokio::test]
    async fn import_registers_every_template() {
        let mut templates = TemplateRegistry::default();
        templates.add_template(Workflow::new("one").with_step(Step::new("a", "agent")));
        templates.add_template(Workflow::new("two"));

        let engine = WorkflowEngine::new(Arc::new(templates), 1);
        assert_eq!(engine.import_templates().await.unwrap(), 2);
        assert_eq!(engine.list_workflows().await, vec!["one", "two"]);
    }
}
