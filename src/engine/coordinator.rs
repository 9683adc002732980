// src/engine/coordinator.rs

//! The scheduler tying graph, state machine, driver and datastore together.
//!
//! There is no engine thread. Every operation runs on the caller's thread:
//! `submit`/`start`/`cancel_*` on the scheduling thread, `complete` on
//! whichever thread the driver reports from. All status writes go through
//! [`TaskStateMachine`]; the coordinator only decides which transition to
//! attempt and reacts to the ones it wins.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::dag::{BuildConfigNode, GraphBuilder, KnownConfig, KnownConfigs, TaskGraph};
use crate::engine::datastore::{BuildRecord, BuildSetRecord, Datastore};
use crate::engine::{ConfigHistory, EngineOptions};
use crate::errors::{BuildcoordError, DriverError, Result};
use crate::exec::{BuildCompletion, BuildDriver, BuildOutcome, BuildRequest, CompletionSink};
use crate::notify::{NotificationDispatcher, Scope, StatusChangeEvent};
use crate::task::{
    BuildSetStatus, BuildSetTask, BuildStatus, BuildTask, SetAggregator, TaskStateMachine,
};
use crate::types::{ConfigId, IdSource, SetId, TaskId};

/// A task that just reached a terminal status, with the status it left.
type Finished = (Arc<BuildTask>, BuildStatus);

/// What a pending task's dependencies currently allow.
enum Readiness {
    Ready,
    Pending,
    Blocked(ConfigId),
}

struct Inner<D, S> {
    options: EngineOptions,
    builder: GraphBuilder,
    graph: RwLock<TaskGraph>,
    sets: DashMap<SetId, Arc<BuildSetTask>>,
    machine: TaskStateMachine,
    history: ConfigHistory,
    driver: D,
    datastore: S,
    building: AtomicUsize,
    dispatching: AtomicBool,
    dispatch_requested: AtomicBool,
}

/// Schedules build sets in dependency order and reacts to build results.
///
/// Cheap to clone; clones share the same engine.
pub struct BuildCoordinator<D, S> {
    inner: Arc<Inner<D, S>>,
}

impl<D, S> Clone for BuildCoordinator<D, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, S> fmt::Debug for BuildCoordinator<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCoordinator")
            .field("options", &self.inner.options)
            .field("live_tasks", &self.inner.graph.read().len())
            .field("sets", &self.inner.sets.len())
            .field("building", &self.inner.building.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Answers the builder's questions about configurations outside a batch.
struct KnownView<'a> {
    graph: &'a TaskGraph,
    history: &'a ConfigHistory,
}

impl KnownConfigs for KnownView<'_> {
    fn lookup(&self, config: &str) -> Option<KnownConfig> {
        if let Some(task) = self.graph.task_for_config(config) {
            if !task.is_terminal() {
                return Some(KnownConfig::Live(task.id()));
            }
        }
        self.history.last(config).map(|status| match status {
            BuildStatus::Done => KnownConfig::Succeeded,
            _ => KnownConfig::Failed,
        })
    }
}

impl<D, S> BuildCoordinator<D, S>
where
    D: BuildDriver,
    S: Datastore,
{
    pub fn new(driver: D, datastore: S, options: EngineOptions) -> Self {
        Self::with_dispatcher(
            driver,
            datastore,
            options,
            Arc::new(NotificationDispatcher::new()),
        )
    }

    /// Use an existing dispatcher, e.g. one shared with other components.
    pub fn with_dispatcher(
        driver: D,
        datastore: S,
        options: EngineOptions,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let ids = Arc::new(IdSource::new());
        Self {
            inner: Arc::new(Inner {
                options,
                builder: GraphBuilder::new(ids),
                graph: RwLock::new(TaskGraph::new()),
                sets: DashMap::new(),
                machine: TaskStateMachine::new(dispatcher),
                history: ConfigHistory::new(),
                driver,
                datastore,
                building: AtomicUsize::new(0),
                dispatching: AtomicBool::new(false),
                dispatch_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        self.inner.machine.dispatcher()
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn datastore(&self) -> &S {
        &self.inner.datastore
    }

    pub fn options(&self) -> EngineOptions {
        self.inner.options
    }

    /// Build a task graph for `nodes` and add it to the live graph as a new
    /// build set. Every task starts in `NEW`; nothing runs until
    /// [`Self::start`].
    pub fn submit(&self, nodes: &[BuildConfigNode], force: &HashSet<ConfigId>) -> Result<SetId> {
        let set = {
            let mut graph = self.inner.graph.write();
            let known = KnownView {
                graph: &*graph,
                history: &self.inner.history,
            };
            let plan = self.inner.builder.build_set(nodes, force, &known)?;

            // The aggregator must exist before any member can transition.
            self.inner
                .machine
                .register_set(Arc::new(SetAggregator::new(Arc::clone(&plan.set))));
            self.inner.sets.insert(plan.set.id(), Arc::clone(&plan.set));
            graph.merge(plan.graph);
            plan.set
        };

        info!(
            set_id = %set.id(),
            tasks = set.members().len(),
            forced = force.len(),
            "build set submitted"
        );
        Ok(set.id())
    }

    /// Resolve the initial status of every member of the set, then hand
    /// ready tasks to the driver. Starting a set twice does nothing.
    pub fn start(&self, set_id: SetId) -> Result<()> {
        let set = self.set(set_id).ok_or(BuildcoordError::SetNotFound(set_id))?;

        if !set.mark_started() {
            debug!(set_id = %set_id, "build set already started");
            return Ok(());
        }

        info!(set_id = %set_id, "starting build set");

        // Members are stored dependency-first.
        let mut finished = VecDeque::new();
        for task in set.members() {
            if let Some(done) = self.resolve_pending(task) {
                finished.push_back(done);
            }
        }
        self.settle(finished);
        self.dispatch_ready();
        Ok(())
    }

    pub fn submit_and_start(
        &self,
        nodes: &[BuildConfigNode],
        force: &HashSet<ConfigId>,
    ) -> Result<SetId> {
        let set_id = self.submit(nodes, force)?;
        self.start(set_id)?;
        Ok(set_id)
    }

    /// Record a driver result for a `BUILDING` task.
    ///
    /// Results for tasks that are no longer building (cancelled, already
    /// completed, unknown) are ignored.
    pub fn complete(&self, task_id: TaskId, result: std::result::Result<BuildOutcome, DriverError>) {
        let Some(task) = self.task(task_id) else {
            debug!(task_id = %task_id, "completion for unknown task ignored");
            return;
        };

        let (status, message) = match result {
            Ok(BuildOutcome::Success) => (BuildStatus::Done, None),
            Ok(BuildOutcome::Failed { reason }) => (BuildStatus::Failed, Some(reason)),
            Ok(BuildOutcome::Rejected { reason }) => (BuildStatus::Rejected, Some(reason)),
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "build driver failed");
                (BuildStatus::SystemError, Some(err.to_string()))
            }
        };

        match self
            .inner
            .machine
            .compare_and_set(&task, BuildStatus::Building, status, message)
        {
            Ok(_) => {
                info!(
                    task_id = %task_id,
                    config = task.config_id(),
                    status = %status,
                    "build finished"
                );
                self.settle(VecDeque::from([(task, BuildStatus::Building)]));
                self.dispatch_ready();
            }
            Err(err) => {
                debug!(task_id = %task_id, error = %err, "late build result ignored");
            }
        }
    }

    /// Cancel one task. Its dependents end up `NOT_BUILT`.
    ///
    /// Returns `false` if the task had already finished.
    pub fn cancel_task(&self, task_id: TaskId) -> Result<bool> {
        let task = self.task(task_id).ok_or(BuildcoordError::TaskNotFound(task_id))?;

        let Some(finished) = self.cancel_one(&task) else {
            return Ok(false);
        };
        self.settle(VecDeque::from([finished]));
        self.dispatch_ready();
        Ok(true)
    }

    /// Cancel every unfinished member of a set and return how many were
    /// cancelled.
    pub fn cancel_set(&self, set_id: SetId) -> Result<usize> {
        let set = self.set(set_id).ok_or(BuildcoordError::SetNotFound(set_id))?;

        // Dependents first, so they end up CANCELLED rather than NOT_BUILT.
        let mut finished = VecDeque::new();
        for task in set.members().iter().rev() {
            if let Some(done) = self.cancel_one(task) {
                finished.push_back(done);
            }
        }

        let cancelled = finished.len();
        info!(set_id = %set_id, cancelled, "build set cancelled");

        self.settle(finished);
        self.dispatch_ready();
        Ok(cancelled)
    }

    /// External transition entry point for a driving workflow engine.
    ///
    /// The transition goes through the state machine like any other; the
    /// coordinator then reacts to it as if it had made it itself. Moving a
    /// task to `BUILDING` takes a build slot and is refused when none is free.
    pub fn set_status(&self, task_id: TaskId, to: BuildStatus) -> Result<StatusChangeEvent> {
        let task = self.task(task_id).ok_or(BuildcoordError::TaskNotFound(task_id))?;

        let takes_slot = to == BuildStatus::Building;
        if takes_slot && !self.try_reserve_slot() {
            return Err(BuildcoordError::NoBuildSlot(task_id));
        }

        let event = match self.inner.machine.set_status(&task, to) {
            Ok(event) => event,
            Err(err) => {
                if takes_slot {
                    self.release_slot();
                }
                return Err(err.into());
            }
        };

        if to.is_terminal() {
            self.settle(VecDeque::from([(task, event.old_status)]));
        }
        self.dispatch_ready();
        Ok(event)
    }

    /// A task still in the live graph.
    pub fn task(&self, task_id: TaskId) -> Option<Arc<BuildTask>> {
        self.inner.graph.read().get(task_id).cloned()
    }

    /// A set that has not been reported yet.
    pub fn set(&self, set_id: SetId) -> Option<Arc<BuildSetTask>> {
        self.inner.sets.get(&set_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn set_status_of(&self, set_id: SetId) -> Option<BuildSetStatus> {
        self.set(set_id).map(|set| set.aggregate_status())
    }

    /// Last terminal status recorded for a configuration.
    pub fn last_status(&self, config: &str) -> Option<BuildStatus> {
        self.inner.history.last(config)
    }

    pub fn live_task_count(&self) -> usize {
        self.inner.graph.read().len()
    }

    pub fn building_count(&self) -> usize {
        self.inner.building.load(Ordering::Acquire)
    }

    fn transition(
        &self,
        task: &BuildTask,
        from: BuildStatus,
        to: BuildStatus,
        message: Option<String>,
    ) -> bool {
        match self.inner.machine.compare_and_set(task, from, to, message) {
            Ok(_) => true,
            Err(err) => {
                trace!(error = %err, "transition skipped");
                false
            }
        }
    }

    /// Move a `NEW` or `WAITING_FOR_DEPENDENCIES` task as far as its
    /// dependencies allow. Returns it if it became terminal.
    fn resolve_pending(&self, task: &Arc<BuildTask>) -> Option<Finished> {
        let status = task.status();
        if !matches!(
            status,
            BuildStatus::New | BuildStatus::WaitingForDependencies
        ) {
            return None;
        }

        let started = task
            .set_id()
            .and_then(|id| self.set(id))
            .map(|set| set.is_started())
            .unwrap_or(true);
        if !started {
            return None;
        }

        let readiness = match task.blocked_by() {
            Some(config) => Readiness::Blocked(config.to_string()),
            None => self.readiness(task),
        };

        match readiness {
            Readiness::Ready => {
                self.transition(task, status, BuildStatus::Enqueued, None);
                None
            }
            Readiness::Pending => {
                if status == BuildStatus::New {
                    self.transition(task, status, BuildStatus::WaitingForDependencies, None);
                }
                None
            }
            Readiness::Blocked(config) => {
                let mut current = status;
                if current == BuildStatus::New
                    && self.transition(task, current, BuildStatus::WaitingForDependencies, None)
                {
                    current = BuildStatus::WaitingForDependencies;
                }

                let message = format!("dependency '{config}' did not build successfully");
                self.transition(task, current, BuildStatus::NotBuilt, Some(message))
                    .then(|| (Arc::clone(task), current))
            }
        }
    }

    fn readiness(&self, task: &BuildTask) -> Readiness {
        let graph = self.inner.graph.read();
        let mut ready = true;

        for (dep_id, dep_config) in task.dependency_configs() {
            let status = graph
                .get(dep_id)
                .map(|dep| dep.status())
                .or_else(|| self.inner.history.last(dep_config));

            match status {
                Some(BuildStatus::Done) => {}
                Some(s) if s.is_failure() => return Readiness::Blocked(dep_config.to_string()),
                _ => ready = false,
            }
        }

        if ready {
            Readiness::Ready
        } else {
            Readiness::Pending
        }
    }

    fn cancel_one(&self, task: &Arc<BuildTask>) -> Option<Finished> {
        loop {
            let current = task.status();
            if current.is_terminal() {
                return None;
            }
            if self.transition(
                task,
                current,
                BuildStatus::Cancelled,
                Some("cancelled".to_string()),
            ) {
                return Some((Arc::clone(task), current));
            }
        }
    }

    /// Process finished tasks and everything that finishes because of them.
    fn settle(&self, mut finished: VecDeque<Finished>) {
        while let Some((task, previous)) = finished.pop_front() {
            for dependent in self.finish_task(&task, previous) {
                if let Some(done) = self.resolve_pending(&dependent) {
                    finished.push_back(done);
                }
            }
        }
    }

    /// Bookkeeping for a task that this caller moved to a terminal status.
    /// Returns the dependents to re-evaluate.
    fn finish_task(&self, task: &Arc<BuildTask>, previous: BuildStatus) -> Vec<Arc<BuildTask>> {
        if previous == BuildStatus::Building {
            self.release_slot();
        }

        self.inner.history.record(task.config_id(), task.status());

        let dependents: Vec<Arc<BuildTask>> = {
            let graph = self.inner.graph.read();
            graph
                .dependents_of(task.id())
                .into_iter()
                .filter_map(|id| graph.get(id).cloned())
                .collect()
        };

        let record = BuildRecord::from_task(task);
        match self.inner.datastore.store_completed_build(&record) {
            Ok(persisted) => {
                debug!(
                    task_id = %task.id(),
                    record_id = persisted.record_id,
                    "build record stored"
                );
                self.inner.graph.write().remove(task.id());
            }
            Err(err) => {
                error!(
                    task_id = %task.id(),
                    error = %err,
                    "failed to store build record; task kept in live graph"
                );
            }
        }

        if let Some(set_id) = task.set_id() {
            self.maybe_finish_set(set_id);
        }
        dependents
    }

    fn maybe_finish_set(&self, set_id: SetId) {
        let Some(set) = self.set(set_id) else {
            return;
        };
        if set.aggregate_status() != BuildSetStatus::Done {
            return;
        }
        // Only one caller gets the aggregator back.
        if self.inner.machine.unregister_set(set_id).is_none() {
            return;
        }
        self.inner.sets.remove(&set_id);

        let record = BuildSetRecord::from_set(&set);
        info!(
            set_id = %set_id,
            done = record.count(BuildStatus::Done),
            members = record.members.len(),
            "build set finished"
        );

        if let Err(err) = self.inner.datastore.store_completed_set(&record) {
            error!(set_id = %set_id, error = %err, "failed to store build set record");
        }

        let dispatcher = self.dispatcher();
        dispatcher.clear_scope(Scope::Set(set_id));
        for task in set.members() {
            dispatcher.clear_scope(Scope::Task(task.id()));
        }
    }

    /// Hand enqueued tasks to the driver while slots are free.
    ///
    /// Re-entrant calls (a driver completing synchronously inside
    /// `start_build`) and concurrent calls only leave a request behind; the
    /// active dispatcher picks it up before returning.
    fn dispatch_ready(&self) {
        let inner = &self.inner;
        inner.dispatch_requested.store(true, Ordering::Release);

        loop {
            if inner
                .dispatching
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            while inner.dispatch_requested.swap(false, Ordering::AcqRel) {
                self.dispatch_pass();
            }

            inner.dispatching.store(false, Ordering::Release);

            if !inner.dispatch_requested.load(Ordering::Acquire) {
                return;
            }
        }
    }

    fn dispatch_pass(&self) {
        let ready: Vec<Arc<BuildTask>> = self
            .inner
            .graph
            .read()
            .tasks()
            .filter(|t| t.status() == BuildStatus::Enqueued)
            .cloned()
            .collect();

        for task in ready {
            if !self.try_reserve_slot() {
                trace!(
                    limit = self.inner.options.max_concurrent_builds,
                    "build limit reached"
                );
                return;
            }

            if self.transition(&task, BuildStatus::Enqueued, BuildStatus::Building, None) {
                self.launch(&task);
            } else {
                self.release_slot();
            }
        }
    }

    fn launch(&self, task: &BuildTask) {
        let request = BuildRequest {
            task_id: task.id(),
            config_id: task.config_id().to_string(),
            name: task.name().to_string(),
            set_id: task.set_id(),
            forced: task.is_forced(),
        };

        info!(
            task_id = %task.id(),
            config = task.config_id(),
            driver = self.inner.driver.name(),
            "dispatching build"
        );

        let sink: Arc<dyn CompletionSink> = Arc::new(self.clone());
        self.inner
            .driver
            .start_build(request, BuildCompletion::new(task.id(), sink));
    }

    fn try_reserve_slot(&self) -> bool {
        let limit = self.inner.options.max_concurrent_builds;
        if limit == 0 {
            self.inner.building.fetch_add(1, Ordering::AcqRel);
            return true;
        }
        self.inner
            .building
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        let _ = self
            .inner
            .building
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

impl<D, S> CompletionSink for BuildCoordinator<D, S>
where
    D: BuildDriver,
    S: Datastore,
{
    fn complete(&self, task: TaskId, result: std::result::Result<BuildOutcome, DriverError>) {
        BuildCoordinator::complete(self, task, result);
    }
}
