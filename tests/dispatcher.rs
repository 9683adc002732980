// tests/dispatcher.rs

mod common;
use crate::common::{RecordingListener, init_tracing};

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;

use buildcoord::errors::ListenerError;
use buildcoord::notify::{
    BuildEvent, BuildSetStatusChangedEvent, FnListener, JsonLinesTransport, Listener,
    NotificationDispatcher, Scope, StatusChangeEvent,
};
use buildcoord::task::{BuildSetStatus, BuildStatus};
use buildcoord::types::{SetId, TaskId};

type TestResult = Result<(), Box<dyn Error>>;

fn task_event(task: u64, set: Option<u64>) -> BuildEvent {
    BuildEvent::TaskStatusChanged(StatusChangeEvent {
        task_id: TaskId(task),
        config_id: format!("cfg-{task}"),
        set_id: set.map(SetId),
        old_status: BuildStatus::Building,
        new_status: BuildStatus::Done,
        timestamp: Utc::now(),
        message: None,
    })
}

fn set_event(set: u64) -> BuildEvent {
    BuildEvent::SetStatusChanged(BuildSetStatusChangedEvent {
        set_id: SetId(set),
        old_status: BuildSetStatus::Building,
        new_status: BuildSetStatus::Done,
        timestamp: Utc::now(),
    })
}

#[test]
fn events_reach_matching_scopes_only() {
    init_tracing();
    let dispatcher = NotificationDispatcher::new();

    let all = RecordingListener::new("all");
    let task_1 = RecordingListener::new("task-1");
    let set_5 = RecordingListener::new("set-5");
    let set_6 = RecordingListener::new("set-6");

    dispatcher.subscribe(Scope::All, all.clone());
    dispatcher.subscribe(Scope::Task(TaskId(1)), task_1.clone());
    dispatcher.subscribe(Scope::Set(SetId(5)), set_5.clone());
    dispatcher.subscribe(Scope::Set(SetId(6)), set_6.clone());

    assert_eq!(dispatcher.publish(&task_event(1, Some(5))), 3);
    assert_eq!(dispatcher.publish(&task_event(2, Some(6))), 2);
    assert_eq!(dispatcher.publish(&set_event(5)), 2);

    assert_eq!(all.len(), 3);
    assert_eq!(task_1.len(), 1);
    assert_eq!(set_5.len(), 2);
    assert_eq!(set_6.len(), 1);
}

#[test]
fn unsubscribe_stops_delivery() {
    init_tracing();
    let dispatcher = NotificationDispatcher::new();
    let listener = RecordingListener::new("once");
    let id = dispatcher.subscribe(Scope::All, listener.clone());

    dispatcher.publish(&set_event(1));
    assert!(dispatcher.unsubscribe(Scope::All, id));
    assert!(!dispatcher.unsubscribe(Scope::All, id));
    dispatcher.publish(&set_event(1));

    assert_eq!(listener.len(), 1);
    assert_eq!(dispatcher.subscription_count(), 0);
}

#[test]
fn failing_listener_is_removed_without_affecting_others() {
    init_tracing();
    let dispatcher = NotificationDispatcher::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let failing = {
        let calls = Arc::clone(&calls);
        FnListener::new("failing", move |_event: &BuildEvent| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ListenerError::Rejected("socket closed".to_string()))
        })
    };
    let healthy = RecordingListener::new("healthy");

    dispatcher.subscribe(Scope::All, Arc::new(failing));
    dispatcher.subscribe(Scope::All, healthy.clone());

    assert_eq!(dispatcher.publish(&set_event(1)), 1);
    assert_eq!(dispatcher.publish(&set_event(1)), 1);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.len(), 2);
    assert_eq!(dispatcher.subscription_count(), 1);
}

struct Panicking;

impl Listener for Panicking {
    fn on_event(&self, _event: &BuildEvent) -> Result<(), ListenerError> {
        panic!("listener bug");
    }
}

#[test]
fn panicking_listener_is_contained() {
    init_tracing();
    let dispatcher = NotificationDispatcher::new();
    let healthy = RecordingListener::new("healthy");

    dispatcher.subscribe(Scope::Set(SetId(1)), Arc::new(Panicking));
    dispatcher.subscribe(Scope::Set(SetId(1)), healthy.clone());

    assert_eq!(dispatcher.publish(&set_event(1)), 1);
    assert_eq!(healthy.len(), 1);
    assert_eq!(dispatcher.subscription_count(), 1);
}

#[test]
fn listener_may_unsubscribe_itself_while_handling_an_event() {
    init_tracing();
    let dispatcher = Arc::new(NotificationDispatcher::new());
    let slot = Arc::new(parking_lot::Mutex::new(None));

    let listener = {
        let dispatcher = Arc::clone(&dispatcher);
        let slot = Arc::clone(&slot);
        FnListener::new("self-removing", move |_event: &BuildEvent| {
            if let Some(id) = slot.lock().take() {
                dispatcher.unsubscribe(Scope::All, id);
            }
            Ok(())
        })
    };
    let id = dispatcher.subscribe(Scope::All, Arc::new(listener));
    *slot.lock() = Some(id);

    assert_eq!(dispatcher.publish(&set_event(1)), 1);
    assert_eq!(dispatcher.publish(&set_event(1)), 0);
}

#[test]
fn clear_scope_drops_all_its_subscriptions() {
    init_tracing();
    let dispatcher = NotificationDispatcher::new();
    dispatcher.subscribe(Scope::Set(SetId(1)), RecordingListener::new("a"));
    dispatcher.subscribe(Scope::Set(SetId(1)), RecordingListener::new("b"));
    dispatcher.subscribe(Scope::All, RecordingListener::new("c"));

    assert_eq!(dispatcher.clear_scope(Scope::Set(SetId(1))), 2);
    assert_eq!(dispatcher.subscription_count(), 1);
}

#[test]
fn json_lines_transport_writes_one_object_per_event() -> TestResult {
    init_tracing();
    let transport = JsonLinesTransport::new(Vec::<u8>::new());

    transport.on_event(&task_event(3, Some(1)))?;
    transport.on_event(&set_event(1))?;

    let output = String::from_utf8(transport.into_inner())?;
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "task_status_changed");
    assert_eq!(lines[0]["task_id"], 3);
    assert_eq!(lines[0]["set_id"], 1);
    assert_eq!(lines[0]["new_status"], "DONE");
    assert!(lines[0].get("message").is_none());
    assert_eq!(lines[1]["type"], "set_status_changed");
    assert_eq!(lines[1]["new_status"], "DONE");
    Ok(())
}
