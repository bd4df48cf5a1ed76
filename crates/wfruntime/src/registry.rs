use std::collections::HashMap;
use std::sync::Arc;
use wfcore::StepExecutor;

/// Registry of step executors keyed by step type
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the built-in executors
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_all(wfexecutors::builtin_executors());
        registry
    }

    /// Register an executor, replacing any previous one for the same type
    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) {
        let step_type = executor.step_type().to_string();
        if self.executors.contains_key(&step_type) {
            tracing::debug!("Replacing step executor: {}", step_type);
        } else {
            tracing::info!("Registering step executor: {}", step_type);
        }
        self.executors.insert(step_type, executor);
    }

    pub fn register_all(&mut self, executors: impl IntoIterator<Item = Arc<dyn StepExecutor>>) {
        for executor in executors {
            self.register(executor);
        }
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(step_type).cloned()
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.executors.contains_key(step_type)
    }

    /// Get all registered step types, sorted
    pub fn list_step_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
