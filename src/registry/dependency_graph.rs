//! # Step Dependency Graph
//!
//! Iterative Kahn traversal over the `depends_on` relation. One pass both
//! detects cycles and produces the execution order in O(V + E); ties among
//! simultaneously ready steps go to the lower layer, then to the step
//! declared first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::ops::Range;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::models::WorkflowStep;

pub struct DependencyGraph<'a> {
    steps: &'a [WorkflowStep],
    /// Edges from a step to the steps that depend on it
    dependents: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph, rejecting duplicate names and unresolvable references
    pub fn build(steps: &'a [WorkflowStep]) -> OrchestrationResult<Self> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.name.as_str(), i).is_some() {
                return Err(OrchestrationError::validation(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }

        let mut dependents = vec![Vec::new(); steps.len()];
        let mut in_degree = vec![0; steps.len()];

        for (i, step) in steps.iter().enumerate() {
            for dependency in &step.depends_on {
                let parent = *index.get(dependency.as_str()).ok_or_else(|| {
                    OrchestrationError::validation(format!(
                        "step '{}' depends on unknown step '{}'",
                        step.name, dependency
                    ))
                })?;
                dependents[parent].push(i);
                in_degree[i] += 1;
            }
        }

        Ok(Self {
            steps,
            dependents,
            in_degree,
        })
    }

    /// Topological order as indices into the declared step list
    pub fn topological_order(&self) -> OrchestrationResult<Vec<usize>> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BinaryHeap<Reverse<(u8, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse((self.steps[i].layer.rank(), i)))
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());

        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(i);
            for &dependent in &self.dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse((self.steps[dependent].layer.rank(), dependent)));
                }
            }
        }

        if order.len() != self.steps.len() {
            let steps = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &degree)| degree > 0)
                .map(|(i, _)| self.steps[i].name.clone())
                .collect();
            return Err(OrchestrationError::CyclicDependency { steps });
        }

        Ok(order)
    }

    pub fn execution_order(&self) -> OrchestrationResult<Vec<&'a WorkflowStep>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|i| &self.steps[i])
            .collect())
    }
}

/// Split an execution order into consecutive batches whose members do not
/// depend on each other. Every dependency of a batch member sits in an
/// earlier batch, so batches can run one after another with their members
/// running concurrently.
pub fn execution_batches(order: &[WorkflowStep], max_width: usize) -> Vec<Range<usize>> {
    let width = max_width.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut in_batch: HashSet<&str> = HashSet::new();

    for (i, step) in order.iter().enumerate() {
        let blocked = step
            .depends_on
            .iter()
            .any(|dependency| in_batch.contains(dependency.as_str()));

        if i > start && (blocked || i - start >= width) {
            batches.push(start..i);
            start = i;
            in_batch.clear();
        }
        in_batch.insert(step.name.as_str());
    }

    if start < order.len() {
        batches.push(start..order.len());
    }

    batches
}
