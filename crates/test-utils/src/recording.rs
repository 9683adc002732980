use std::sync::Arc;

use parking_lot::Mutex;

use buildcoord::errors::ListenerError;
use buildcoord::notify::{BuildEvent, BuildSetStatusChangedEvent, Listener, StatusChangeEvent};
use buildcoord::task::{BuildSetStatus, BuildStatus};
use buildcoord::types::TaskId;

/// Listener that keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    name: String,
    events: Mutex<Vec<BuildEvent>>,
}

impl RecordingListener {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn task_events(&self) -> Vec<StatusChangeEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.as_task_event().cloned())
            .collect()
    }

    pub fn set_events(&self) -> Vec<BuildSetStatusChangedEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.as_set_event().cloned())
            .collect()
    }

    /// Statuses a task passed through, in order, starting with the first
    /// target status.
    pub fn statuses_of(&self, task: TaskId) -> Vec<BuildStatus> {
        self.task_events()
            .into_iter()
            .filter(|e| e.task_id == task)
            .map(|e| e.new_status)
            .collect()
    }

    /// Statuses of the set aggregate, in order.
    pub fn set_statuses(&self) -> Vec<BuildSetStatus> {
        self.set_events().into_iter().map(|e| e.new_status).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Listener for RecordingListener {
    fn on_event(&self, event: &BuildEvent) -> Result<(), ListenerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
