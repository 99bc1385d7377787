//! Structural validation and static wave planning.
//!
//! `validate_workflow` is pure and runs on register, update, and defensively
//! before every execution. Cycle detection is an iterative depth-first walk
//! over the `depends_on` edges with grey/black marking so that the reported
//! error can name the cycle path. `execution_waves` uses `petgraph` to group
//! an already-valid workflow into dependency waves.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use toolweave_types::workflow::{RetryConfig, WorkflowDefinition, WorkflowStep};

use super::definition::WorkflowError;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the structure of a workflow definition.
///
/// Checks, in order: non-empty name and step list, unique step IDs, entry
/// point exists, every dependency resolves, no dependency cycle, and finally
/// the numeric bounds of timeouts and retry policies.
pub fn validate_workflow(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }
    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for step in &def.steps {
        if !seen.insert(step.id.as_str()) {
            return Err(WorkflowError::DuplicateStepId(step.id.clone()));
        }
    }

    if !seen.contains(def.entry_point.as_str()) {
        return Err(WorkflowError::MissingEntryPoint(def.entry_point.clone()));
    }

    for step in &def.steps {
        for dep in &step.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                )));
            }
        }
    }

    if let Some(cycle) = find_cycle(&def.steps) {
        return Err(WorkflowError::CycleDetected(cycle.join(" -> ")));
    }

    if def.timeout_secs == Some(0) {
        return Err(WorkflowError::ValidationError(
            "workflow timeout must be greater than zero".to_string(),
        ));
    }
    if let Some(retry) = &def.retry_config {
        validate_retry(retry, "workflow")?;
    }
    for step in &def.steps {
        if step.timeout_secs == Some(0) {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' timeout must be greater than zero",
                step.id
            )));
        }
        if let Some(retry) = &step.retry_config {
            validate_retry(retry, &format!("step '{}'", step.id))?;
        }
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig, owner: &str) -> Result<(), WorkflowError> {
    if retry.max_attempts < 1 {
        return Err(WorkflowError::ValidationError(format!(
            "{owner} retry max_attempts must be at least 1"
        )));
    }
    if !(retry.backoff_factor >= 1.0) {
        return Err(WorkflowError::ValidationError(format!(
            "{owner} retry backoff_factor must be at least 1"
        )));
    }
    if !(retry.initial_delay >= 0.0) {
        return Err(WorkflowError::ValidationError(format!(
            "{owner} retry initial_delay must not be negative"
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Find a dependency cycle, returning the step IDs along it with the first
/// step repeated at the end (`a -> b -> a`).
///
/// Assumes every dependency resolves to a step.
fn find_cycle(steps: &[WorkflowStep]) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let edges: Vec<Vec<usize>> = steps
        .iter()
        .map(|s| {
            s.depends_on
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .collect()
        })
        .collect();

    let mut marks = vec![Mark::White; steps.len()];
    for root in 0..steps.len() {
        if marks[root] != Mark::White {
            continue;
        }
        // (node, next edge to visit); the stack doubles as the grey path.
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Grey;

        while let Some(&(node, next)) = stack.last() {
            if let Some(&child) = edges[node].get(next) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks[child] {
                    Mark::White => {
                        marks[child] = Mark::Grey;
                        stack.push((child, 0));
                    }
                    Mark::Grey => {
                        let start = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                        let mut path: Vec<String> = stack[start..]
                            .iter()
                            .map(|(n, _)| steps[*n].id.clone())
                            .collect();
                        path.push(steps[child].id.clone());
                        return Some(path);
                    }
                    Mark::Black => {}
                }
            } else {
                marks[node] = Mark::Black;
                stack.pop();
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Static wave plan
// ---------------------------------------------------------------------------

/// Group the steps of a workflow into dependency waves.
///
/// Wave 0 holds every step without dependencies; each later step lands one
/// wave after its deepest dependency. Within a wave, steps keep definition
/// order. This is the plan the engine follows when no step fails.
pub fn execution_waves(def: &WorkflowDefinition) -> Result<Vec<Vec<&WorkflowStep>>, WorkflowError> {
    validate_workflow(def)?;

    let steps = &def.steps;
    let id_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    // Edge from dependency -> dependent
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..steps.len()).map(|i| graph.add_node(i)).collect();
    for (to, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            if let Some(&from) = id_to_idx.get(dep.as_str()) {
                graph.add_edge(nodes[from], nodes[to], ());
            }
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| {
        let step_id = &steps[graph[cycle.node_id()]].id;
        WorkflowError::CycleDetected(format!("cycle detected involving step '{step_id}'"))
    })?;

    let mut depths = vec![0usize; steps.len()];
    for node in sorted {
        let idx = graph[node];
        depths[idx] = steps[idx]
            .depends_on
            .iter()
            .filter_map(|d| id_to_idx.get(d.as_str()))
            .map(|&d| depths[d] + 1)
            .max()
            .unwrap_or(0);
    }

    let max_depth = depths.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&WorkflowStep>> = vec![Vec::new(); max_depth + 1];
    for (idx, step) in steps.iter().enumerate() {
        waves[depths[idx]].push(step);
    }
    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{delay_step, workflow};

    fn wave_ids(waves: &[Vec<&WorkflowStep>]) -> Vec<Vec<String>> {
        waves
            .iter()
            .map(|w| w.iter().map(|s| s.id.clone()).collect())
            .collect()
    }

    #[test]
    fn test_valid_workflow_passes() {
        let def = workflow(vec![
            delay_step("a", &[]),
            delay_step("b", &["a"]),
            delay_step("c", &["a", "b"]),
        ]);
        validate_workflow(&def).unwrap();
    }

    #[test]
    fn test_rejects_duplicate_step_ids() {
        let def = workflow(vec![delay_step("a", &[]), delay_step("a", &[])]);
        let err = validate_workflow(&def).unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateStepId(ref id) if id == "a"));
    }

    #[test]
    fn test_rejects_missing_entry_point() {
        let mut def = workflow(vec![delay_step("a", &[])]);
        def.entry_point = "start".to_string();
        let err = validate_workflow(&def).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingEntryPoint(_)));
    }

    #[test]
    fn test_rejects_dangling_dependency() {
        let def = workflow(vec![delay_step("a", &["ghost"])]);
        let err = validate_workflow(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown step 'ghost'"), "got: {msg}");
    }

    #[test]
    fn test_cycle_error_names_path() {
        let def = workflow(vec![
            delay_step("a", &["c"]),
            delay_step("b", &["a"]),
            delay_step("c", &["b"]),
        ]);
        let err = validate_workflow(&def).unwrap_err();
        match err {
            WorkflowError::CycleDetected(path) => assert_eq!(path, "a -> c -> b -> a"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let def = workflow(vec![delay_step("a", &["a"])]);
        let err = validate_workflow(&def).unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(ref p) if p == "a -> a"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let def = workflow(vec![
            delay_step("a", &[]),
            delay_step("b", &["a"]),
            delay_step("c", &["a"]),
            delay_step("d", &["b", "c"]),
        ]);
        validate_workflow(&def).unwrap();
    }

    #[test]
    fn test_rejects_empty_workflow_and_name() {
        let mut def = workflow(vec![]);
        assert!(validate_workflow(&def).unwrap_err().to_string().contains("at least one step"));

        def = workflow(vec![delay_step("a", &[])]);
        def.name = "  ".to_string();
        assert!(validate_workflow(&def).unwrap_err().to_string().contains("name"));
    }

    #[test]
    fn test_rejects_bad_numeric_bounds() {
        let mut def = workflow(vec![delay_step("a", &[])]);
        def.timeout_secs = Some(0);
        assert!(validate_workflow(&def).is_err());

        let mut def = workflow(vec![delay_step("a", &[])]);
        def.retry_config = Some(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert!(validate_workflow(&def).unwrap_err().to_string().contains("max_attempts"));

        let mut def = workflow(vec![delay_step("a", &[])]);
        def.steps[0].retry_config = Some(RetryConfig {
            backoff_factor: 0.5,
            ..RetryConfig::default()
        });
        let msg = validate_workflow(&def).unwrap_err().to_string();
        assert!(msg.contains("step 'a'") && msg.contains("backoff_factor"), "got: {msg}");

        let mut def = workflow(vec![delay_step("a", &[])]);
        def.steps[0].retry_config = Some(RetryConfig {
            initial_delay: -1.0,
            ..RetryConfig::default()
        });
        assert!(validate_workflow(&def).unwrap_err().to_string().contains("initial_delay"));
    }

    #[test]
    fn test_execution_waves_fan_out() {
        let def = workflow(vec![
            delay_step("a", &[]),
            delay_step("b", &["a"]),
            delay_step("c", &["a"]),
            delay_step("d", &["b", "c"]),
        ]);
        let waves = execution_waves(&def).unwrap();
        assert_eq!(
            wave_ids(&waves),
            vec![vec!["a"], vec!["b", "c"], vec!["d"]]
        );
    }

    #[test]
    fn test_execution_waves_uses_deepest_dependency() {
        let def = workflow(vec![
            delay_step("a", &[]),
            delay_step("b", &["a"]),
            delay_step("c", &["a", "b"]),
            delay_step("x", &[]),
        ]);
        let waves = execution_waves(&def).unwrap();
        assert_eq!(
            wave_ids(&waves),
            vec![vec!["a", "x"], vec!["b"], vec!["c"]]
        );
    }
}
