// src/notify/dispatcher.rs

//! In-process publish/subscribe broker for build events.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::errors::ListenerError;
use crate::notify::{BuildEvent, Scope};

/// A subscriber to build events.
///
/// Returning an error (or panicking) gets the listener removed from the
/// dispatcher; it never affects delivery to other listeners.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &BuildEvent) -> Result<(), ListenerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "listener"
    }
}

/// Adapter turning a closure into a [`Listener`].
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&BuildEvent) -> Result<(), ListenerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Listener for FnListener<F>
where
    F: Fn(&BuildEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &BuildEvent) -> Result<(), ListenerError> {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handle returned by [`NotificationDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    listener: Arc<dyn Listener>,
}

/// Publish/subscribe broker keyed by [`Scope`].
///
/// `publish` snapshots the matching listeners and invokes them without holding
/// the registry lock, so listeners may subscribe or unsubscribe from inside
/// `on_event`.
pub struct NotificationDispatcher {
    listeners: RwLock<HashMap<Scope, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, scope: Scope, listener: Arc<dyn Listener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(?scope, listener = listener.name(), "subscribing listener");
        self.listeners
            .write()
            .entry(scope)
            .or_default()
            .push(Subscription { id, listener });
        id
    }

    /// Returns `false` if the subscription was not (or no longer) registered.
    pub fn unsubscribe(&self, scope: Scope, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(subs) = listeners.get_mut(&scope) else {
            return false;
        };

        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;

        if subs.is_empty() {
            listeners.remove(&scope);
        }
        removed
    }

    /// Drop every subscription of a scope, e.g. once a set has been reported.
    pub fn clear_scope(&self, scope: Scope) -> usize {
        self.listeners
            .write()
            .remove(&scope)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    pub fn subscription_count(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// Deliver `event` to every matching listener and return how many
    /// accepted it.
    pub fn publish(&self, event: &BuildEvent) -> usize {
        let targets = self.snapshot(event);
        let mut delivered = 0;

        for (scope, id, listener) in targets {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));

            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    warn!(
                        listener = listener.name(),
                        ?scope,
                        error = %err,
                        "listener failed; removing subscription"
                    );
                    self.unsubscribe(scope, id);
                }
                Err(_) => {
                    warn!(
                        listener = listener.name(),
                        ?scope,
                        "listener panicked; removing subscription"
                    );
                    self.unsubscribe(scope, id);
                }
            }
        }

        trace!(delivered, "event published");
        delivered
    }

    fn snapshot(&self, event: &BuildEvent) -> Vec<(Scope, SubscriptionId, Arc<dyn Listener>)> {
        let listeners = self.listeners.read();
        let mut targets = Vec::new();

        for scope in event.scopes().into_iter().chain(std::iter::once(Scope::All)) {
            if let Some(subs) = listeners.get(&scope) {
                targets.extend(
                    subs.iter()
                        .map(|s| (scope, s.id, Arc::clone(&s.listener))),
                );
            }
        }
        targets
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
