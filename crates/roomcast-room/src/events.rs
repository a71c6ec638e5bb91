//! Outbound notifications from the room core to its collaborators.
//!
//! The bus is the only way the core talks to the outside (UI layers,
//! logging). It is purely outbound: observers cannot answer through it.
//! Fan-out is synchronous and in registration order; there is no queueing,
//! replay, or cross-channel ordering guarantee beyond the order the core
//! publishes within one handler.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::error;

use roomcast_protocol::Envelope;

/// The four notification channels the core publishes on.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A chat, private, or system envelope to display.
    Message(Envelope),
    /// The membership directory changed; the full sorted name list.
    UserList(Vec<String>),
    /// Room membership established (`true`) or ended (`false`).
    RoomState(bool),
    /// A non-fatal error somewhere in the core, already logged.
    Error(String),
}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
/// Dropping the token does nothing; removal is always explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(RoomEvent) + Send + Sync + 'static>;

/// Multicast publish point for [`RoomEvent`]s.
///
/// Cheap to clone; clones share the observer list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    observers: RwLock<Vec<(SubscriptionId, Observer)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for all future events.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(RoomEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sub_id, _)| *sub_id != id);
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fans `event` out to every observer, in registration order.
    ///
    /// Never panics outward: a panicking observer is caught and logged and
    /// the remaining observers still run.
    pub fn publish(&self, event: RoomEvent) {
        let observers = self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, observer) in observers {
            let event = event.clone();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer(event))) {
                error!(
                    subscription = id.0,
                    reason = panic_message(&panic),
                    "event observer panicked"
                );
            }
        }
    }

    // The four publish operations the core calls.

    pub fn publish_message(&self, envelope: Envelope) {
        self.publish(RoomEvent::Message(envelope));
    }

    pub fn publish_user_list(&self, names: Vec<String>) {
        self.publish(RoomEvent::UserList(names));
    }

    pub fn publish_room_state(&self, in_room: bool) {
        self.publish(RoomEvent::RoomState(in_room));
    }

    pub fn publish_error(&self, message: impl Into<String>) {
        self.publish(RoomEvent::Error(message.into()));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
