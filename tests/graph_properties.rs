// tests/graph_properties.rs

mod common;
use crate::common::{InstantDriver, coordinator, no_force};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use buildcoord::dag::{BuildConfigNode, GraphBuilder, NoHistory};
use buildcoord::engine::EngineOptions;
use buildcoord::errors::GraphError;
use buildcoord::task::{BuildSetStatus, BuildStatus};
use buildcoord::types::IdSource;

// Acyclic by construction: node N may only depend on nodes 0..N-1.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<BuildConfigNode>> {
    (1..=max_nodes).prop_flat_map(|count| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), count).prop_map(
            |raw_deps| {
                raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let deps: BTreeSet<usize> = picks
                            .into_iter()
                            .filter(|_| i > 0)
                            .map(|p| p % i)
                            .collect();
                        deps.into_iter().fold(
                            BuildConfigNode::new(format!("cfg_{i}")),
                            |node, dep| node.depends_on(format!("cfg_{dep}")),
                        )
                    })
                    .collect()
            },
        )
    })
}

/// Indices of nodes reachable from `start` by following dependencies.
fn ancestors(nodes: &[BuildConfigNode], start: usize) -> HashSet<usize> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(i) = stack.pop() {
        for dep in &nodes[i].dependency_ids {
            let d = index[dep.as_str()];
            if seen.insert(d) {
                stack.push(d);
            }
        }
    }
    seen
}

proptest! {
    #[test]
    fn acyclic_graphs_build_one_task_per_node(nodes in dag_strategy(12)) {
        let graph = GraphBuilder::new(Arc::new(IdSource::new()))
            .build(&nodes, &no_force(), &NoHistory)
            .expect("acyclic graph must build");

        prop_assert_eq!(graph.len(), nodes.len());

        let order = graph.topological_order().expect("acyclic graph must sort");
        let position: HashMap<_, _> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for task in graph.tasks() {
            for dep in task.dependencies() {
                prop_assert!(position[&dep] < position[&task.id()]);
            }
        }
    }

    #[test]
    fn closing_any_path_into_a_cycle_is_rejected(
        nodes in dag_strategy(12),
        pick in any::<usize>(),
    ) {
        // Make an ancestor of some node depend on that node.
        let candidates: Vec<(usize, usize)> = (0..nodes.len())
            .flat_map(|i| ancestors(&nodes, i).into_iter().map(move |a| (i, a)))
            .collect();
        prop_assume!(!candidates.is_empty());

        let (node, ancestor) = candidates[pick % candidates.len()];
        let mut cyclic = nodes.clone();
        let closing = cyclic[node].id.clone();
        cyclic[ancestor].dependency_ids.insert(closing);

        let ids = Arc::new(IdSource::new());
        let result = GraphBuilder::new(Arc::clone(&ids)).build(&cyclic, &no_force(), &NoHistory);
        let is_cycle = matches!(result, Err(GraphError::CycleDetected { .. }));
        prop_assert!(is_cycle);
        prop_assert_eq!(ids.next_task_id().0, 1);
    }

    #[test]
    fn builds_start_only_after_every_dependency_is_done(
        nodes in dag_strategy(10),
        failing in proptest::collection::hash_set(0..10usize, 0..3),
    ) {
        let driver = InstantDriver::new();
        for i in &failing {
            if *i < nodes.len() {
                driver.fail(&format!("cfg_{i}"));
            }
        }

        let (coordinator, datastore, events) = coordinator(&driver, EngineOptions::unlimited());
        let set_id = coordinator.submit_and_start(&nodes, &no_force()).expect("submit");

        // Every task finished and was persisted; the set was reported once.
        prop_assert_eq!(coordinator.live_task_count(), 0);
        prop_assert_eq!(datastore.builds().len(), nodes.len());
        prop_assert_eq!(datastore.sets().len(), 1);
        let set_done = events
            .set_events()
            .iter()
            .filter(|e| e.set_id == set_id && e.new_status == BuildSetStatus::Done)
            .count();
        prop_assert_eq!(set_done, 1);

        // Replay the event stream: at BUILDING time every dependency is DONE.
        let mut status: HashMap<String, BuildStatus> = HashMap::new();
        for event in events.task_events() {
            if event.new_status == BuildStatus::Building {
                let idx: usize = event.config_id["cfg_".len()..].parse().expect("index");
                for dep in &nodes[idx].dependency_ids {
                    prop_assert_eq!(status.get(dep.as_str()), Some(&BuildStatus::Done));
                }
            }
            status.insert(event.config_id.clone(), event.new_status);
        }

        // Anything downstream of a failure never built.
        for (i, _) in nodes.iter().enumerate() {
            let failed_upstream = ancestors(&nodes, i)
                .into_iter()
                .any(|a| failing.contains(&a));
            let final_status = coordinator.last_status(&format!("cfg_{i}"));
            if failed_upstream {
                prop_assert_eq!(final_status, Some(BuildStatus::NotBuilt));
            } else if failing.contains(&i) {
                prop_assert_eq!(final_status, Some(BuildStatus::Failed));
            } else {
                prop_assert_eq!(final_status, Some(BuildStatus::Done));
            }
        }
    }
}
