use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use wfcore::{Workflow, WorkflowError};

/// Build the `depends_on` graph (edge: dependency -> dependent).
///
/// References to unknown step ids are left out; they surface as unmet
/// dependencies when the run reaches that step.
fn build_graph(workflow: &Workflow) -> Result<DiGraph<&str, ()>, WorkflowError> {
    let mut graph = DiGraph::new();
    let mut step_to_index: HashMap<&str, NodeIndex> = HashMap::new();

    for step in &workflow.steps {
        if step_to_index.contains_key(step.id.as_str()) {
            return Err(WorkflowError::Invalid(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        let idx = graph.add_node(step.id.as_str());
        step_to_index.insert(step.id.as_str(), idx);
    }

    for step in &workflow.steps {
        let to_idx = step_to_index[step.id.as_str()];
        for dep in &step.depends_on {
            if let Some(from_idx) = step_to_index.get(dep.as_str()) {
                graph.add_edge(*from_idx, to_idx, ());
            }
        }
    }

    Ok(graph)
}

/// Reject definitions the engine can never run to completion:
/// an empty name, duplicate step ids, or a dependency cycle.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), WorkflowError> {
    if workflow.name.trim().is_empty() {
        return Err(WorkflowError::Invalid(
            "workflow name must not be empty".to_string(),
        ));
    }
    execution_plan(workflow).map(|_| ())
}

/// Step ids in an order that satisfies every known dependency
pub fn execution_plan(workflow: &Workflow) -> Result<Vec<String>, WorkflowError> {
    let graph = build_graph(workflow)?;
    let order = toposort(&graph, None)
        .map_err(|cycle| WorkflowError::CyclicDependency(graph[cycle.node_id()].to_string()))?;
    Ok(order.into_iter().map(|idx| graph[idx].to_string()).collect())
}
