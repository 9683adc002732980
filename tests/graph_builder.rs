// tests/graph_builder.rs

mod common;
use crate::common::{chain, force, init_tracing, no_force, node};

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use buildcoord::dag::{GraphBuilder, KnownConfig, NoHistory};
use buildcoord::errors::GraphError;
use buildcoord::task::BuildStatus;
use buildcoord::types::{IdSource, TaskId};

type TestResult = Result<(), Box<dyn Error>>;

fn builder() -> GraphBuilder {
    init_tracing();
    GraphBuilder::new(Arc::new(IdSource::new()))
}

#[test]
fn creates_one_new_task_per_node_with_dependency_edges() -> TestResult {
    let nodes = vec![node("A", &[]), node("B", &["A"]), node("C", &["A", "B"])];
    let plan = builder().build_set(&nodes, &no_force(), &NoHistory)?;
    let graph = &plan.graph;

    assert_eq!(graph.len(), 3);
    assert_eq!(plan.set.members().len(), 3);
    assert!(graph.tasks().all(|t| t.status() == BuildStatus::New));
    assert!(graph.tasks().all(|t| t.set_id() == Some(plan.set.id())));

    let a = graph.task_for_config("A").ok_or("missing A")?.id();
    let b = graph.task_for_config("B").ok_or("missing B")?.id();
    let c = graph.task_for_config("C").ok_or("missing C")?.id();

    assert_eq!(graph.dependencies_of(c), vec![a, b]);
    let mut dependents_of_a = graph.dependents_of(a);
    dependents_of_a.sort();
    assert_eq!(dependents_of_a, vec![b, c]);
    assert_eq!(graph.roots(), vec![a]);

    let order = graph.topological_order()?;
    let pos = |id: TaskId| order.iter().position(|x| *x == id);
    assert!(pos(a) < pos(b));
    assert!(pos(b) < pos(c));
    Ok(())
}

#[test]
fn set_members_are_stored_dependency_first() -> TestResult {
    // Declared in reverse order on purpose.
    let nodes = vec![node("C", &["B"]), node("B", &["A"]), node("A", &[])];
    let plan = builder().build_set(&nodes, &no_force(), &NoHistory)?;

    let configs: Vec<&str> = plan.set.members().iter().map(|t| t.config_id()).collect();
    assert_eq!(configs, vec!["A", "B", "C"]);
    Ok(())
}

#[test]
fn cycle_is_rejected_and_names_its_members() {
    let nodes = vec![node("A", &["C"]), node("B", &["A"]), node("C", &["B"])];
    let ids = Arc::new(IdSource::new());
    let err = GraphBuilder::new(Arc::clone(&ids))
        .build(&nodes, &no_force(), &NoHistory)
        .unwrap_err();

    match err {
        GraphError::CycleDetected { members } => {
            assert_eq!(members.first(), members.last());
            for id in ["A", "B", "C"] {
                assert!(members.iter().any(|m| m == id), "{id} missing from {members:?}");
            }
        }
        other => panic!("expected a cycle, got {other:?}"),
    }

    // No task id was handed out.
    assert_eq!(ids.next_task_id(), TaskId(1));
}

#[test]
fn self_dependency_is_a_cycle() {
    let err = builder()
        .build(&[node("A", &["A"])], &no_force(), &NoHistory)
        .unwrap_err();
    assert!(matches!(err, GraphError::CycleDetected { .. }));
}

#[test]
fn cycle_behind_an_acyclic_prefix_is_found() {
    let nodes = vec![
        node("root", &[]),
        node("x", &["root", "z"]),
        node("y", &["x"]),
        node("z", &["y"]),
    ];
    let err = builder().build(&nodes, &no_force(), &NoHistory).unwrap_err();
    let GraphError::CycleDetected { members } = err else {
        panic!("expected a cycle");
    };
    assert!(!members.iter().any(|m| m == "root"));
}

#[test]
fn unknown_dependency_is_unsatisfiable() {
    let err = builder()
        .build(&[node("A", &["ghost"])], &no_force(), &NoHistory)
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::UnsatisfiableDependency {
            config: "A".to_string(),
            dependency: "ghost".to_string(),
        }
    );
}

#[test]
fn duplicate_and_empty_batches_are_rejected() {
    let b = builder();
    assert_eq!(
        b.build(&[node("A", &[]), node("A", &[])], &no_force(), &NoHistory)
            .unwrap_err(),
        GraphError::DuplicateConfig("A".to_string())
    );
    assert_eq!(
        b.build(&[], &no_force(), &NoHistory).unwrap_err(),
        GraphError::EmptyBatch
    );
}

#[test]
fn external_dependencies_resolve_against_known_configs() -> TestResult {
    let mut known = HashMap::new();
    known.insert("live".to_string(), KnownConfig::Live(TaskId(42)));
    known.insert("ok".to_string(), KnownConfig::Succeeded);
    known.insert("broken".to_string(), KnownConfig::Failed);

    let nodes = vec![
        node("on-live", &["live"]),
        node("on-ok", &["ok"]),
        node("on-broken", &["broken"]),
        node("forced", &["broken"]),
    ];
    let graph = builder().build(&nodes, &force(&["forced"]), &known)?;

    let on_live = graph.task_for_config("on-live").ok_or("missing")?;
    assert_eq!(on_live.dependencies().collect::<Vec<_>>(), vec![TaskId(42)]);
    assert_eq!(on_live.blocked_by(), None);

    let on_ok = graph.task_for_config("on-ok").ok_or("missing")?;
    assert_eq!(on_ok.dependencies().count(), 0);
    assert_eq!(on_ok.blocked_by(), None);

    let on_broken = graph.task_for_config("on-broken").ok_or("missing")?;
    assert_eq!(on_broken.blocked_by(), Some("broken"));

    let forced = graph.task_for_config("forced").ok_or("missing")?;
    assert!(forced.is_forced());
    assert_eq!(forced.blocked_by(), None);
    Ok(())
}

#[test]
fn batch_containing_a_live_config_is_rejected() {
    let mut known = HashMap::new();
    known.insert("A".to_string(), KnownConfig::Live(TaskId(7)));

    let err = builder().build(&chain(&["A", "B"]), &no_force(), &known).unwrap_err();
    assert_eq!(
        err,
        GraphError::AlreadyBuilding {
            config: "A".to_string(),
            task: TaskId(7),
        }
    );
}

#[test]
fn removing_a_task_drops_its_edges() -> TestResult {
    let mut graph = builder().build(&chain(&["A", "B", "C"]), &no_force(), &NoHistory)?;
    let a = graph.task_for_config("A").ok_or("missing")?.id();
    let b = graph.task_for_config("B").ok_or("missing")?.id();

    assert!(graph.remove(a).is_some());
    assert!(graph.dependents_of(a).is_empty());
    assert!(graph.task_for_config("A").is_none());
    // B still names A as a dependency, but A is outside the graph now.
    assert_eq!(graph.roots(), vec![b]);
    assert_eq!(graph.topological_order()?.len(), 2);
    Ok(())
}
