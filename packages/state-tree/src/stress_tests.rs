//! Randomized tests over generated trees.
//!
//! Every test runs a fixed range of seeds so failures are reproducible:
//! the failing seed is part of the assertion message.
//!
//! Run with: `cargo test stress`

#[cfg(test)]
mod tests {
    use fastrand::Rng;
    use serde_json::{json, Value};

    use crate::core::{Action, Phase};
    use crate::node::{Node, NodeType, Shape};
    use crate::testing::EventRecorder;

    const SEEDS: u64 = 64;
    const MAX_DEPTH: usize = 4;

    // ==========================================================================
    // Tree generation
    // ==========================================================================

    struct RandomTree {
        root: Node,
        /// Every node, root first.
        nodes: Vec<Node>,
    }

    fn set_reducer(node: &Node, payload: &[Value]) -> anyhow::Result<Value> {
        let value = payload.first().cloned().unwrap_or(Value::Null);
        let mut state = node.state();
        match &mut state {
            Value::Object(fields) => {
                fields.insert("v".to_string(), value);
                Ok(state)
            }
            _ => Ok(value),
        }
    }

    fn build(rng: &mut Rng, depth: usize, nodes: &mut Vec<Node>) -> Node {
        let ty = NodeType::new(format!("N{}", nodes.len()));
        ty.register_action("set", set_reducer).unwrap();
        let node = ty.create();
        nodes.push(node.clone());

        let child_count = if depth >= MAX_DEPTH { 0 } else { rng.usize(0..=3) };
        if child_count == 0 && rng.bool() {
            node.initialize(json!(rng.i64(0..100))).unwrap();
            return node;
        }

        let mut shape = Shape::fields().field("v", rng.i64(0..100));
        for i in 0..child_count {
            let child = build(rng, depth + 1, nodes);
            shape = shape.child(format!("c{i}"), &child);
        }
        node.initialize(shape).unwrap();
        node
    }

    fn random_tree(seed: u64) -> (Rng, RandomTree) {
        let mut rng = Rng::with_seed(seed);
        let mut nodes = Vec::new();
        let root = build(&mut rng, 0, &mut nodes);
        (rng, RandomTree { root, nodes })
    }

    fn path_to(target: &Node) -> Vec<Node> {
        let mut path: Vec<Node> = target.ancestors().collect();
        path.reverse();
        path.push(target.clone());
        path
    }

    // ==========================================================================
    // Properties
    // ==========================================================================

    #[test]
    fn stress_before_descends_after_unwinds() {
        for seed in 0..SEEDS {
            let (mut rng, tree) = random_tree(seed);
            let recorder = EventRecorder::new();
            for node in &tree.nodes {
                node.subscribe(recorder.subscriber().before(true).after(true).bubble(true))
                    .unwrap();
            }

            let target = &tree.nodes[rng.usize(0..tree.nodes.len())];
            target.act("set", vec![json!(-1)]).unwrap();

            let path = path_to(target);
            let mut expected: Vec<(String, Phase)> = path
                .iter()
                .map(|n| (n.type_name().to_string(), Phase::Before))
                .collect();
            expected.extend(
                path.iter()
                    .rev()
                    .map(|n| (n.type_name().to_string(), Phase::After)),
            );

            assert_eq!(recorder.trail(), expected, "seed {seed}");
            assert!(
                recorder.types().iter().all(|t| t.ends_with("set")),
                "seed {seed}"
            );
        }
    }

    #[test]
    fn stress_non_bubbling_sees_only_own_actions() {
        for seed in 0..SEEDS {
            let (mut rng, tree) = random_tree(seed);
            let own: Vec<EventRecorder> = tree
                .nodes
                .iter()
                .map(|node| {
                    let recorder = EventRecorder::new();
                    node.subscribe(recorder.subscriber()).unwrap();
                    recorder
                })
                .collect();
            let bubbling: Vec<EventRecorder> = tree
                .nodes
                .iter()
                .map(|node| {
                    let recorder = EventRecorder::new();
                    node.subscribe(recorder.subscriber().bubble(true)).unwrap();
                    recorder
                })
                .collect();

            let target_index = rng.usize(0..tree.nodes.len());
            let target = &tree.nodes[target_index];
            target.act("set", vec![json!(seed)]).unwrap();

            let on_path = path_to(target);
            for (i, node) in tree.nodes.iter().enumerate() {
                let expected_own = usize::from(i == target_index);
                assert_eq!(own[i].len(), expected_own, "seed {seed}, node {i}");

                let expected_bubbling = usize::from(on_path.contains(node));
                assert_eq!(bubbling[i].len(), expected_bubbling, "seed {seed}, node {i}");
            }
        }
    }

    #[test]
    fn stress_snapshot_round_trip() {
        for seed in 0..SEEDS {
            let (mut rng, tree) = random_tree(seed);

            for _ in 0..rng.usize(0..20) {
                let target = &tree.nodes[rng.usize(0..tree.nodes.len())];
                target.act("set", vec![json!(rng.i64(..))]).unwrap();
            }

            let before = tree.root.snapshot().unwrap();
            tree.root.restore(before.clone()).unwrap();
            assert_eq!(tree.root.snapshot().unwrap(), before, "seed {seed}");

            // Same seed, same shape: the snapshot transplants onto a fresh tree.
            let (_, twin) = random_tree(seed);
            twin.root.restore(before.clone()).unwrap();
            assert_eq!(twin.root.snapshot().unwrap(), before, "seed {seed}");
        }
    }

    #[test]
    fn stress_dispatch_paths_match_action_creators() {
        for seed in 0..SEEDS {
            let (mut rng, tree) = random_tree(seed);
            let (_, twin) = random_tree(seed);

            for _ in 0..10 {
                let index = rng.usize(0..tree.nodes.len());
                let value = json!(rng.i64(..));

                tree.nodes[index].act("set", vec![value.clone()]).unwrap();

                let path = tree.nodes[index].path();
                let action_type = if path.is_empty() {
                    "set".to_string()
                } else {
                    format!("{path}.set")
                };
                twin.root
                    .dispatch(Action::new(action_type, vec![value]))
                    .unwrap();
            }

            assert_eq!(
                tree.root.snapshot().unwrap(),
                twin.root.snapshot().unwrap(),
                "seed {seed}"
            );
        }
    }
}
