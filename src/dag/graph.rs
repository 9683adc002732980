// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::GraphError;
use crate::task::BuildTask;
use crate::types::{ConfigId, TaskId};

/// In-memory task graph keyed by task id.
///
/// Tasks only know their own dependencies; the reverse edges are indexed
/// here. A dependency may point at a task that is not in this graph (a task
/// already persisted and removed, or one that lives in another graph before
/// a merge); lookups simply skip it.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, Arc<BuildTask>>,
    dependents: HashMap<TaskId, BTreeSet<TaskId>>,
    by_config: HashMap<ConfigId, TaskId>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: Arc<BuildTask>) {
        let id = task.id();
        for dep in task.dependencies() {
            self.dependents.entry(dep).or_default().insert(id);
        }
        self.by_config.insert(task.config_id().to_string(), id);
        self.tasks.insert(id, task);
    }

    /// Move every task of `other` into this graph.
    pub fn merge(&mut self, other: TaskGraph) {
        for task in other.tasks.into_values() {
            self.insert(task);
        }
    }

    /// Remove a task. Dependent edges pointing at it are dropped with it.
    pub fn remove(&mut self, id: TaskId) -> Option<Arc<BuildTask>> {
        let task = self.tasks.remove(&id)?;

        for dep in task.dependencies() {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.remove(&id);
                if set.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
        self.dependents.remove(&id);

        if self.by_config.get(task.config_id()) == Some(&id) {
            self.by_config.remove(task.config_id());
        }
        Some(task)
    }

    pub fn get(&self, id: TaskId) -> Option<&Arc<BuildTask>> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Latest task inserted for a configuration.
    pub fn task_for_config(&self, config: &str) -> Option<&Arc<BuildTask>> {
        self.by_config.get(config).and_then(|id| self.tasks.get(id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<BuildTask>> {
        self.tasks.values()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Direct dependencies of a task.
    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        self.tasks
            .get(&id)
            .map(|t| t.dependencies().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of a task (tasks that depend on it).
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        self.dependents
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Tasks without dependencies inside this graph.
    pub fn roots(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.dependencies().all(|dep| !self.tasks.contains_key(&dep)))
            .map(|t| t.id())
            .collect()
    }

    /// Task ids ordered so that every task comes after its dependencies.
    ///
    /// Edges to tasks outside the graph are ignored.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        // Edge direction: dependency -> dependent.
        let mut graph: DiGraphMap<TaskId, ()> = DiGraphMap::new();

        for id in self.tasks.keys() {
            graph.add_node(*id);
        }
        for task in self.tasks.values() {
            for dep in task.dependencies() {
                if self.tasks.contains_key(&dep) {
                    graph.add_edge(dep, task.id(), ());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let member = self
                .tasks
                .get(&cycle.node_id())
                .map(|t| t.config_id().to_string())
                .unwrap_or_else(|| cycle.node_id().to_string());
            GraphError::CycleDetected {
                members: vec![member],
            }
        })
    }
}
