//! # Event Bus
//!
//! Typed, topic-based notification of persisted transitions. One topic per
//! transition ([`SubscriptionEvent`]); the payload is the record as
//! persisted.
//!
//! ## Delivery
//!
//! Synchronous, in registration order, on the publishing task. Each
//! listener is isolated: an `Err` result or a panic is caught, logged and
//! recorded in the [`DeliveryReport`], and later listeners still run.
//! Nothing a listener does reaches the transition's caller.
//!
//! The bus is an explicit instance shared by `Arc`; there is no global
//! registry. The listener table lock is released before any listener
//! runs, so a listener may itself subscribe or unsubscribe.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use sublife_state::{Subscription, SubscriptionEvent};

/// Error type listeners may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A registered callback.
pub type Listener = Arc<dyn Fn(&Subscription) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// One listener that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Which listener.
    pub listener: ListenerId,
    /// Error message or panic payload.
    pub message: String,
}

/// Outcome of one [`EventBus::publish`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked.
    pub failed: Vec<ListenerFailure>,
}

impl DeliveryReport {
    /// Whether every listener succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Topic-based listener registry.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<SubscriptionEvent, Vec<(ListenerId, Listener)>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .listeners
            .read()
            .iter()
            .map(|(event, ls)| (event.name(), ls.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `event`. Listeners on the same topic run in
    /// registration order.
    pub fn subscribe<F>(&self, event: SubscriptionEvent, listener: F) -> ListenerId
    where
        F: Fn(&Subscription) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event)
            .or_default()
            .push((id, Arc::new(listener)));
        tracing::debug!(event = event.name(), listener = id.0, "listener registered");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        for registered in listeners.values_mut() {
            if let Some(pos) = registered.iter().position(|(lid, _)| *lid == id) {
                registered.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of listeners on `event`.
    pub fn listener_count(&self, event: SubscriptionEvent) -> usize {
        self.listeners.read().get(&event).map_or(0, Vec::len)
    }

    /// Deliver `subscription` to every listener on `event`.
    pub fn publish(&self, event: SubscriptionEvent, subscription: &Subscription) -> DeliveryReport {
        let snapshot: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .get(&event)
            .cloned()
            .unwrap_or_default();

        let mut report = DeliveryReport::default();
        for (id, listener) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(subscription)));
            let message = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            tracing::warn!(
                event = event.name(),
                listener = id.0,
                subscription = %subscription.id(),
                error = %message,
                "event listener failed"
            );
            report.failed.push(ListenerFailure {
                listener: id,
                message,
            });
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
