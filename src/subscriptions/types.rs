//! Subscription types for table change notifications.

use crate::types::ChangeEvent;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Callback invoked synchronously for every change on a subscribed table.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Where a subscription's events go.
#[derive(Clone)]
pub(crate) enum Sink {
    Callback(ChangeCallback),
    /// Bounded channel; the subscriber is dropped once it fills up.
    Channel(Sender<ChangeEvent>),
}

/// Internal subscription state.
#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) id: SubscriptionId,
    pub(crate) table: String,
    pub(crate) sink: Sink,
}

/// Registration list shared between the bus and outstanding handles.
pub(crate) type Registry = RwLock<Vec<Listener>>;

/// Handle to an active subscription.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: SubscriptionId,
    table: String,
    registry: Weak<Registry>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, table: String, registry: &Arc<Registry>) -> Self {
        Self {
            id,
            table,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the bus still delivers to this subscription.
    pub fn is_active(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let active = registry.read().iter().any(|l| l.id == self.id);
        active
    }

    /// Stop receiving events. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut listeners = registry.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != self.id);
        listeners.len() != before
    }
}

/// Subscription that delivers events into a channel.
pub struct ChannelSubscription {
    pub subscription: Subscription,
    /// Channel to receive events.
    pub receiver: Receiver<ChangeEvent>,
}

impl ChannelSubscription {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ChangeEvent, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ChangeEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain every event currently buffered.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn unsubscribe(&self) -> bool {
        self.subscription.unsubscribe()
    }
}
