mod common;

use common::strategies::*;
use content_architect::registry::{execution_batches, validate_workflow, DependencyGraph};
use content_architect::OrchestrationError;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

proptest! {
    /// Property: the execution order is a permutation of the declared steps
    #[test]
    fn execution_order_is_a_permutation(workflow in acyclic_workflow_strategy(25)) {
        let graph = DependencyGraph::build(&workflow.steps).unwrap();
        let order = graph.execution_order().unwrap();

        prop_assert_eq!(order.len(), workflow.steps.len());
        let names: HashSet<&str> = order.iter().map(|s| s.name.as_str()).collect();
        prop_assert_eq!(names.len(), workflow.steps.len());
    }

    /// Property: every dependency runs before its dependent
    #[test]
    fn dependencies_precede_dependents(workflow in acyclic_workflow_strategy(25)) {
        let graph = DependencyGraph::build(&workflow.steps).unwrap();
        let order = graph.execution_order().unwrap();
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        for step in &order {
            for dependency in &step.depends_on {
                prop_assert!(
                    position[dependency.as_str()] < position[step.name.as_str()],
                    "{} must run before {}", dependency, step.name
                );
            }
        }
    }

    /// Property: generated acyclic workflows pass validation
    #[test]
    fn acyclic_workflows_validate(workflow in acyclic_workflow_strategy(25)) {
        prop_assert!(validate_workflow(&workflow).is_ok());
    }

    /// Property: any cycle is reported as a cyclic dependency
    #[test]
    fn cycles_are_rejected(workflow in cyclic_workflow_strategy(15)) {
        let graph = DependencyGraph::build(&workflow.steps).unwrap();
        let is_cyclic = matches!(
            graph.topological_order(),
            Err(OrchestrationError::CyclicDependency { .. })
        );
        prop_assert!(is_cyclic);
        prop_assert!(
            matches!(
                validate_workflow(&workflow),
                Err(OrchestrationError::CyclicDependency { .. })
            ),
            "validation should surface the cycle"
        );
    }

    /// Property: batches cover the order and never hold a step with its dependency
    #[test]
    fn batches_partition_the_order(
        workflow in acyclic_workflow_strategy(25),
        width in 1usize..6,
    ) {
        let graph = DependencyGraph::build(&workflow.steps).unwrap();
        let order: Vec<_> = graph.execution_order().unwrap().into_iter().cloned().collect();
        let batches = execution_batches(&order, width);

        let mut next = 0;
        for range in &batches {
            prop_assert_eq!(range.start, next);
            prop_assert!(range.len() <= width);
            prop_assert!(!range.is_empty());
            next = range.end;

            let members: HashSet<&str> = order[range.clone()].iter().map(|s| s.name.as_str()).collect();
            for step in &order[range.clone()] {
                prop_assert!(step.depends_on.iter().all(|d| !members.contains(d.as_str())));
            }
        }
        prop_assert_eq!(next, order.len());
    }
}
