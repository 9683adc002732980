// src/notify/event.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::task::{BuildSetStatus, BuildStatus};
use crate::types::{ConfigId, SetId, TaskId};

/// Produced once for every accepted task transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChangeEvent {
    pub task_id: TaskId,
    pub config_id: ConfigId,
    pub set_id: Option<SetId>,
    pub old_status: BuildStatus,
    pub new_status: BuildStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Produced when a set's aggregate status changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSetStatusChangedEvent {
    pub set_id: SetId,
    pub old_status: BuildSetStatus,
    pub new_status: BuildSetStatus,
    pub timestamp: DateTime<Utc>,
}

/// Everything the dispatcher delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    TaskStatusChanged(StatusChangeEvent),
    SetStatusChanged(BuildSetStatusChangedEvent),
}

impl BuildEvent {
    /// Scopes whose subscribers receive this event (wildcard excluded).
    pub fn scopes(&self) -> Vec<Scope> {
        match self {
            BuildEvent::TaskStatusChanged(e) => {
                let mut scopes = vec![Scope::Task(e.task_id)];
                if let Some(set_id) = e.set_id {
                    scopes.push(Scope::Set(set_id));
                }
                scopes
            }
            BuildEvent::SetStatusChanged(e) => vec![Scope::Set(e.set_id)],
        }
    }

    pub fn as_task_event(&self) -> Option<&StatusChangeEvent> {
        match self {
            BuildEvent::TaskStatusChanged(e) => Some(e),
            BuildEvent::SetStatusChanged(_) => None,
        }
    }

    pub fn as_set_event(&self) -> Option<&BuildSetStatusChangedEvent> {
        match self {
            BuildEvent::SetStatusChanged(e) => Some(e),
            BuildEvent::TaskStatusChanged(_) => None,
        }
    }
}

/// Subscription key.
///
/// Set subscribers receive both the set's aggregate events and every member
/// task event; `All` receives everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    Task(TaskId),
    Set(SetId),
}
