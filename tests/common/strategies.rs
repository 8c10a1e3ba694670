use content_architect::models::{Layer, Workflow, WorkflowStep};
use proptest::prelude::*;
use proptest::sample::Index;

pub fn layer_strategy() -> impl Strategy<Value = Layer> {
    prop_oneof![Just(Layer::Bottom), Just(Layer::Middle), Just(Layer::Top)]
}

/// Steps `s0..sN` where each step may only depend on lower-numbered steps,
/// declared in a shuffled order
pub fn acyclic_steps_strategy(max_steps: usize) -> impl Strategy<Value = Vec<WorkflowStep>> {
    prop::collection::vec(
        (layer_strategy(), prop::collection::vec(any::<Index>(), 0..4)),
        1..=max_steps,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (layer, picks))| {
                // service refs are unique per step so (layer, service) never collides
                let step = WorkflowStep::new(format!("s{i}"), layer, format!("svc-{i}"));
                if i == 0 {
                    step
                } else {
                    step.depends_on(picks.iter().map(|pick| format!("s{}", pick.index(i))))
                }
            })
            .collect::<Vec<_>>()
    })
    .prop_shuffle()
}

pub fn acyclic_workflow_strategy(max_steps: usize) -> impl Strategy<Value = Workflow> {
    acyclic_steps_strategy(max_steps)
        .prop_map(|steps| Workflow::new("generated", "Generated", "generated", steps))
}

/// An acyclic workflow with one two-step cycle spliced in
pub fn cyclic_workflow_strategy(max_steps: usize) -> impl Strategy<Value = Workflow> {
    (acyclic_steps_strategy(max_steps.max(2)), any::<Index>(), any::<Index>())
        .prop_filter("needs two steps", |(steps, _, _)| steps.len() >= 2)
        .prop_map(|(mut steps, first, second)| {
            let len = steps.len();
            let a = first.index(len);
            let mut b = second.index(len);
            if a == b {
                b = (b + 1) % len;
            }
            let name_a = steps[a].name.clone();
            let name_b = steps[b].name.clone();
            steps[a].depends_on.insert(name_b);
            steps[b].depends_on.insert(name_a);
            Workflow::new("cyclic", "Cyclic", "generated", steps)
        })
}
