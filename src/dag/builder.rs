// src/dag/builder.rs

//! Turns build configuration nodes into a task graph.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::{BuildConfigNode, TaskGraph};
use crate::errors::GraphError;
use crate::task::{BuildSetTask, BuildTask};
use crate::types::{ConfigId, IdSource, TaskId};

/// What the caller already knows about a configuration outside the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownConfig {
    /// A non-terminal task for this configuration exists.
    Live(TaskId),
    /// Last build finished successfully.
    Succeeded,
    /// Last build finished without success.
    Failed,
}

/// Lookup of previously-known configurations.
pub trait KnownConfigs {
    fn lookup(&self, config: &str) -> Option<KnownConfig>;
}

/// Nothing is known outside the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl KnownConfigs for NoHistory {
    fn lookup(&self, _config: &str) -> Option<KnownConfig> {
        None
    }
}

impl KnownConfigs for HashMap<ConfigId, KnownConfig> {
    fn lookup(&self, config: &str) -> Option<KnownConfig> {
        self.get(config).copied()
    }
}

/// Result of one [`GraphBuilder::build_set`] call: the batch's tasks and
/// the set that owns them.
#[derive(Debug)]
pub struct BuildPlan {
    pub graph: TaskGraph,
    pub set: Arc<BuildSetTask>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Constructs task graphs, rejecting cycles and unsatisfiable dependencies
/// before any task exists.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    ids: Arc<IdSource>,
}

impl GraphBuilder {
    pub fn new(ids: Arc<IdSource>) -> Self {
        Self { ids }
    }

    /// Build the task graph for `nodes` without creating a set.
    pub fn build(
        &self,
        nodes: &[BuildConfigNode],
        force: &HashSet<ConfigId>,
        known: &dyn KnownConfigs,
    ) -> Result<TaskGraph, GraphError> {
        self.build_set(nodes, force, known).map(|plan| plan.graph)
    }

    /// Build the task graph for `nodes` together with its owning set.
    ///
    /// Every node gets exactly one task in `NEW`. On error nothing is
    /// allocated beyond ids.
    pub fn build_set(
        &self,
        nodes: &[BuildConfigNode],
        force: &HashSet<ConfigId>,
        known: &dyn KnownConfigs,
    ) -> Result<BuildPlan, GraphError> {
        if nodes.is_empty() {
            return Err(GraphError::EmptyBatch);
        }

        let by_id = index_nodes(nodes)?;
        let order = topological_configs(nodes, &by_id)?;
        let external = resolve_external(nodes, &by_id, known)?;

        let set_id = self.ids.next_set_id();
        let mut task_ids: HashMap<&str, TaskId> = HashMap::new();
        let mut tasks = Vec::with_capacity(nodes.len());

        // Dependencies first, so their ids are known when dependents are created.
        for idx in order {
            let node = &nodes[idx];
            let forced = force.contains(&node.id);
            let id = self.ids.next_task_id();

            let mut dependencies = BTreeMap::new();
            let mut blocked_by = None;

            for dep in &node.dependency_ids {
                if let Some(dep_id) = task_ids.get(dep.as_str()) {
                    dependencies.insert(*dep_id, dep.clone());
                    continue;
                }
                match external.get(dep.as_str()) {
                    Some(KnownConfig::Live(live)) => {
                        dependencies.insert(*live, dep.clone());
                    }
                    Some(KnownConfig::Failed) if !forced => {
                        blocked_by.get_or_insert_with(|| dep.clone());
                    }
                    Some(KnownConfig::Failed) | Some(KnownConfig::Succeeded) | None => {}
                }
            }

            let task = BuildTask::new(
                id,
                node.id.clone(),
                node.name.clone(),
                Some(set_id),
                forced,
                dependencies,
                blocked_by,
            );
            task_ids.insert(node.id.as_str(), id);
            tasks.push(Arc::new(task));
        }

        let mut graph = TaskGraph::new();
        for task in &tasks {
            graph.insert(Arc::clone(task));
        }

        let set = Arc::new(BuildSetTask::new(set_id, tasks));

        info!(
            set_id = %set_id,
            tasks = graph.len(),
            "built task graph for build set"
        );

        Ok(BuildPlan { graph, set })
    }
}

fn index_nodes(nodes: &[BuildConfigNode]) -> Result<HashMap<&str, usize>, GraphError> {
    let mut by_id = HashMap::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
        if by_id.insert(node.id.as_str(), idx).is_some() {
            return Err(GraphError::DuplicateConfig(node.id.clone()));
        }
    }
    Ok(by_id)
}

/// Depth-first traversal with three-colour marking over the in-batch edges.
///
/// Returns node indices in dependency-first order, or the members of the
/// first cycle found, in traversal order.
fn topological_configs(
    nodes: &[BuildConfigNode],
    by_id: &HashMap<&str, usize>,
) -> Result<Vec<usize>, GraphError> {
    let mut color = vec![Color::White; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    for start in 0..nodes.len() {
        if color[start] != Color::White {
            continue;
        }

        // Explicit stack of (node, next dependency position) keeps deep chains
        // off the call stack; the stack is also the current grey path.
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        color[start] = Color::Grey;

        while let Some(&(node, pos)) = stack.last() {
            let next = nodes[node]
                .dependency_ids
                .iter()
                .filter_map(|dep| by_id.get(dep.as_str()).copied())
                .nth(pos);

            let Some(next) = next else {
                color[node] = Color::Black;
                order.push(node);
                stack.pop();
                continue;
            };

            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            match color[next] {
                Color::White => {
                    color[next] = Color::Grey;
                    stack.push((next, 0));
                }
                Color::Grey => {
                    let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    let mut members: Vec<ConfigId> = stack[from..]
                        .iter()
                        .map(|&(n, _)| nodes[n].id.clone())
                        .collect();
                    members.push(nodes[next].id.clone());
                    debug!(?members, "cycle detected while building task graph");
                    return Err(GraphError::CycleDetected { members });
                }
                Color::Black => {}
            }
        }
    }

    Ok(order)
}

/// Classify every dependency that is not part of the batch.
fn resolve_external<'a>(
    nodes: &'a [BuildConfigNode],
    by_id: &HashMap<&str, usize>,
    known: &dyn KnownConfigs,
) -> Result<HashMap<&'a str, KnownConfig>, GraphError> {
    let mut external = HashMap::new();

    for node in nodes {
        if let Some(KnownConfig::Live(task)) = known.lookup(&node.id) {
            return Err(GraphError::AlreadyBuilding {
                config: node.id.clone(),
                task,
            });
        }

        for dep in &node.dependency_ids {
            if by_id.contains_key(dep.as_str()) || external.contains_key(dep.as_str()) {
                continue;
            }
            match known.lookup(dep) {
                Some(state) => {
                    external.insert(dep.as_str(), state);
                }
                None => {
                    return Err(GraphError::UnsatisfiableDependency {
                        config: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
    }

    Ok(external)
}
