// src/notify/mod.rs

//! Status-change notification.
//!
//! - [`event`] holds the event values and subscription scopes.
//! - [`dispatcher`] is the publish/subscribe broker.
//! - [`transport`] forwards events to an external writer as JSON lines.

pub mod dispatcher;
pub mod event;
pub mod transport;

pub use dispatcher::{FnListener, Listener, NotificationDispatcher, SubscriptionId};
pub use event::{BuildEvent, BuildSetStatusChangedEvent, Scope, StatusChangeEvent};
pub use transport::JsonLinesTransport;
