use crate::{duration, Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Built-in step type identifiers
pub mod step_types {
    pub const AGENT: &str = "agent";
    pub const CONDITION: &str = "condition";
    pub const PARALLEL: &str = "parallel";
    pub const LOOP: &str = "loop";
    pub const TRANSFORM: &str = "transform";
}

/// Complete workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub inputs: HashMap<String, Field>,
    #[serde(default)]
    pub outputs: HashMap<String, Field>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub options: WorkflowOptions,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            description: String::new(),
            trigger: Trigger::default(),
            steps: Vec::new(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            env: HashMap::new(),
            options: WorkflowOptions::default(),
        }
    }

    /// Decode a YAML (or JSON) workflow document.
    pub fn from_yaml(source: &str) -> Result<Self, WorkflowError> {
        serde_yaml_ng::from_str(source).map_err(|e| WorkflowError::Parse(e.to_string()))
    }

    pub fn from_json(source: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(source).map_err(|e| WorkflowError::Parse(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, WorkflowError> {
        serde_yaml_ng::to_string(self).map_err(|e| WorkflowError::Parse(e.to_string()))
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, field: Field) -> Self {
        self.inputs.insert(name.into(), field);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    pub fn find_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Field defaults overlaid by caller-supplied values (caller wins).
    pub fn merge_inputs(&self, inputs: HashMap<String, Value>) -> HashMap<String, Value> {
        let mut merged: HashMap<String, Value> = self
            .inputs
            .iter()
            .filter_map(|(name, field)| match &field.default {
                Some(default) if !default.is_null() => Some((name.clone(), default.clone())),
                _ => None,
            })
            .collect();
        merged.extend(inputs);
        merged
    }

    /// Required inputs with neither a default nor a value in `inputs`.
    pub fn missing_required_inputs<'a>(&'a self, inputs: &HashMap<String, Value>) -> Vec<&'a str> {
        let mut missing: Vec<&str> = self
            .inputs
            .iter()
            .filter(|(name, field)| field.required && !inputs.contains_key(name.as_str()))
            .map(|(name, _)| name.as_str())
            .collect();
        missing.sort_unstable();
        missing
    }
}

/// How a workflow is started.
///
/// A trigger without a `type` is manual; missing schedule, event or webhook
/// lists decode as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "RawTrigger")]
pub enum Trigger {
    #[default]
    Manual,
    Cron {
        cron: String,
    },
    Event {
        events: Vec<String>,
    },
    Webhook {
        webhooks: Vec<String>,
    },
}

/// Document shape of a trigger: a flat mapping whose keys are all optional.
#[derive(Deserialize)]
struct RawTrigger {
    #[serde(rename = "type", default)]
    trigger_type: String,
    #[serde(default)]
    cron: String,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    webhooks: Vec<String>,
}

impl TryFrom<RawTrigger> for Trigger {
    type Error = String;

    fn try_from(raw: RawTrigger) -> Result<Self, Self::Error> {
        match raw.trigger_type.as_str() {
            "" | "manual" => Ok(Trigger::Manual),
            "cron" => Ok(Trigger::Cron { cron: raw.cron }),
            "event" => Ok(Trigger::Event { events: raw.events }),
            "webhook" => Ok(Trigger::Webhook {
                webhooks: raw.webhooks,
            }),
            other => Err(format!("unknown trigger type '{}'", other)),
        }
    }
}

/// Input/output field descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Field {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Workflow execution options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOptions {
    #[serde(default)]
    pub concurrency: usize,
    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub debug: bool,
}

/// Single step in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct Step {
    pub id: String,
    pub name: String,
    pub step_type: String,
    pub config: Option<StepConfig>,
    pub timeout: Option<Duration>,
    pub retry: RetryConfig,
    pub on_failure: Option<String>,
    pub depends_on: Vec<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            step_type: step_type.into(),
            config: None,
            timeout: None,
            retry: RetryConfig::default(),
            on_failure: None,
            depends_on: Vec::new(),
        }
    }

    pub fn agent(id: impl Into<String>, config: AgentConfig) -> Self {
        Self::new(id, step_types::AGENT).with_config(StepConfig::Agent(config))
    }

    pub fn condition(id: impl Into<String>, config: ConditionConfig) -> Self {
        Self::new(id, step_types::CONDITION).with_config(StepConfig::Condition(config))
    }

    pub fn parallel(id: impl Into<String>, config: ParallelConfig) -> Self {
        Self::new(id, step_types::PARALLEL).with_config(StepConfig::Parallel(config))
    }

    pub fn looping(id: impl Into<String>, config: LoopConfig) -> Self {
        Self::new(id, step_types::LOOP).with_config(StepConfig::Loop(config))
    }

    pub fn transform(id: impl Into<String>, config: TransformConfig) -> Self {
        Self::new(id, step_types::TRANSFORM).with_config(StepConfig::Transform(config))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    pub fn continue_on_failure(mut self, marker: impl Into<String>) -> Self {
        self.on_failure = Some(marker.into());
        self
    }

    /// A non-empty `on_failure` marker downgrades failures to a logged skip.
    pub fn continues_on_failure(&self) -> bool {
        self.on_failure.as_deref().is_some_and(|m| !m.is_empty())
    }

    pub fn agent_config(&self) -> Option<&AgentConfig> {
        match &self.config {
            Some(StepConfig::Agent(c)) => Some(c),
            _ => None,
        }
    }

    pub fn condition_config(&self) -> Option<&ConditionConfig> {
        match &self.config {
            Some(StepConfig::Condition(c)) => Some(c),
            _ => None,
        }
    }

    pub fn parallel_config(&self) -> Option<&ParallelConfig> {
        match &self.config {
            Some(StepConfig::Parallel(c)) => Some(c),
            _ => None,
        }
    }

    pub fn loop_config(&self) -> Option<&LoopConfig> {
        match &self.config {
            Some(StepConfig::Loop(c)) => Some(c),
            _ => None,
        }
    }

    pub fn transform_config(&self) -> Option<&TransformConfig> {
        match &self.config {
            Some(StepConfig::Transform(c)) => Some(c),
            _ => None,
        }
    }
}

/// Type-specific step payload; only the variant matching the step is set
#[derive(Debug, Clone, PartialEq)]
pub enum StepConfig {
    Agent(AgentConfig),
    Condition(ConditionConfig),
    Parallel(ParallelConfig),
    Loop(LoopConfig),
    Transform(TransformConfig),
}

impl StepConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StepConfig::Agent(_) => step_types::AGENT,
            StepConfig::Condition(_) => step_types::CONDITION,
            StepConfig::Parallel(_) => step_types::PARALLEL,
            StepConfig::Loop(_) => step_types::LOOP,
            StepConfig::Transform(_) => step_types::TRANSFORM,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub true_steps: Vec<String>,
    #[serde(default)]
    pub false_steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default)]
    pub over: String,
    #[serde(default)]
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub script: String,
}

/// Retry policy for step execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default, with = "duration")]
    pub delay: Duration,
    #[serde(default)]
    pub backoff: Backoff,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            delay,
            backoff,
        }
    }

    /// Total attempts, counting the first one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause before the attempt that follows `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }

    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Document shape of a step: one optional key per payload kind.
#[derive(Serialize, Deserialize)]
struct RawStep {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent: Option<AgentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<ConditionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parallel: Option<ParallelConfig>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    loop_config: Option<LoopConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transform: Option<TransformConfig>,
    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "RetryConfig::is_default")]
    retry: RetryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let mut configs = [
            raw.agent.map(StepConfig::Agent),
            raw.condition.map(StepConfig::Condition),
            raw.parallel.map(StepConfig::Parallel),
            raw.loop_config.map(StepConfig::Loop),
            raw.transform.map(StepConfig::Transform),
        ]
        .into_iter()
        .flatten();

        let config = configs.next();
        if let Some(extra) = configs.next() {
            return Err(format!(
                "step '{}' declares more than one payload ({} and {})",
                raw.id,
                config.as_ref().map(StepConfig::kind).unwrap_or_default(),
                extra.kind()
            ));
        }

        Ok(Step {
            id: raw.id,
            name: raw.name,
            step_type: raw.step_type,
            config,
            timeout: raw.timeout,
            retry: raw.retry,
            on_failure: raw.on_failure.filter(|m| !m.is_empty()),
            depends_on: raw.depends_on,
        })
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let mut raw = RawStep {
            id: step.id,
            name: step.name,
            step_type: step.step_type,
            agent: None,
            condition: None,
            parallel: None,
            loop_config: None,
            transform: None,
            timeout: step.timeout,
            retry: step.retry,
            on_failure: step.on_failure,
            depends_on: step.depends_on,
        };
        match step.config {
            Some(StepConfig::Agent(c)) => raw.agent = Some(c),
            Some(StepConfig::Condition(c)) => raw.condition = Some(c),
            Some(StepConfig::Parallel(c)) => raw.parallel = Some(c),
            Some(StepConfig::Loop(c)) => raw.loop_config = Some(c),
            Some(StepConfig::Transform(c)) => raw.transform = Some(c),
            None => {}
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
name: research
version: "1.0"
description: Research a topic and summarise it
trigger:
  type: cron
  cron: "0 9 * * *"
inputs:
  topic:
    type: string
    required: true
  depth:
    type: number
    default: 2
steps:
  - id: gather
    name: Gather sources
    type: agent
    agent:
      provider: anthropic
      model: claude
      prompt: "Research {{topic}}"
      tools: [search]
    timeout: 2m
    retry:
      max_attempts: 3
      delay: 500ms
      backoff: exponential
  - id: summarise
    type: transform
    transform:
      input: gather.result
      output: summary
    depends_on: [gather]
    on_failure: continue
options:
  concurrency: 2
  timeout: 10m
"#;

    #[test]
    fn parses_full_document() {
        let workflow = Workflow::from_yaml(DOCUMENT).unwrap();

        assert_eq!(workflow.name, "research");
        assert_eq!(
            workflow.trigger,
            Trigger::Cron {
                cron: "0 9 * * *".to_string()
            }
        );
        assert_eq!(workflow.steps.len(), 2);

        let gather = &workflow.steps[0];
        assert_eq!(gather.step_type, step_types::AGENT);
        assert_eq!(gather.agent_config().unwrap().tools, vec!["search"]);
        assert_eq!(gather.timeout, Some(Duration::from_secs(120)));
        assert_eq!(gather.retry.attempts(), 3);
        assert_eq!(gather.retry.backoff, Backoff::Exponential);
        assert!(!gather.continues_on_failure());

        let summarise = workflow.find_step("summarise").unwrap();
        assert_eq!(summarise.depends_on, vec!["gather"]);
        assert!(summarise.continues_on_failure());
        assert!(summarise.agent_config().is_none());
        assert_eq!(summarise.transform_config().unwrap().output, "summary");

        assert_eq!(workflow.options.timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn yaml_round_trip_preserves_structure() {
        let workflow = Workflow::from_yaml(DOCUMENT).unwrap();
        let reparsed = Workflow::from_yaml(&workflow.to_yaml().unwrap()).unwrap();
        assert_eq!(workflow, reparsed);
    }

    #[test]
    fn sparse_triggers_decode() {
        let cron = Workflow::from_yaml("name: a\ntrigger: {type: cron}\n").unwrap();
        assert_eq!(
            cron.trigger,
            Trigger::Cron {
                cron: String::new()
            }
        );

        let untyped = Workflow::from_yaml("name: b\ntrigger: {cron: \"* * * * *\"}\n").unwrap();
        assert_eq!(untyped.trigger, Trigger::Manual);

        let events = Workflow::from_yaml("name: c\ntrigger: {type: event}\n").unwrap();
        assert_eq!(events.trigger, Trigger::Event { events: Vec::new() });

        assert!(matches!(
            Workflow::from_yaml("name: d\ntrigger: {type: carrier-pigeon}\n"),
            Err(WorkflowError::Parse(msg)) if msg.contains("unknown trigger type")
        ));
    }

    #[test]
    fn rejects_two_payloads_on_one_step() {
        let doc = r#"
name: broken
steps:
  - id: a
    type: agent
    agent: {prompt: hi}
    loop: {max_iterations: 3}
"#;
        let err = Workflow::from_yaml(doc).unwrap_err();
        assert!(matches!(err, WorkflowError::Parse(msg) if msg.contains("more than one payload")));
    }

    #[test]
    fn rejects_malformed_document() {
        assert!(matches!(
            Workflow::from_yaml("steps: [1, 2"),
            Err(WorkflowError::Parse(_))
        ));
        assert!(matches!(
            Workflow::from_yaml("description: no name"),
            Err(WorkflowError::Parse(_))
        ));
    }

    #[test]
    fn merge_prefers_caller_values() {
        let workflow = Workflow::new("merge")
            .with_input("depth", Field::new("number").with_default(2_i64))
            .with_input("lang", Field::new("string").with_default("en"))
            .with_input("topic", Field::new("string").required());

        let mut inputs = HashMap::new();
        inputs.insert("lang".to_string(), Value::from("de"));
        let merged = workflow.merge_inputs(inputs);

        assert_eq!(merged["depth"], Value::Number(2.0));
        assert_eq!(merged["lang"], Value::from("de"));
        assert!(!merged.contains_key("topic"));
        assert_eq!(workflow.missing_required_inputs(&merged), vec!["topic"]);
    }

    #[test]
    fn exponential_backoff_doubles() {
        let retry = RetryConfig::new(4, Duration::from_millis(100), Backoff::Exponential);
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(3), Duration::from_millis(400));

        let fixed = RetryConfig::new(4, Duration::from_millis(100), Backoff::Fixed);
        assert_eq!(fixed.delay_after(3), Duration::from_millis(100));
        assert_eq!(RetryConfig::default().attempts(), 1);
    }
}
