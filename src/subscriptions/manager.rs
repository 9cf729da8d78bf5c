//! Event bus broadcasting table changes to subscribers.

use crate::types::{ChangeEvent, ChangeKind, Row};
use crossbeam_channel::bounded;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{
    ChangeCallback, ChannelSubscription, Listener, Registry, Sink, Subscription, SubscriptionId,
};

/// Default channel buffer before a channel subscriber is dropped.
pub const DEFAULT_CHANNEL_BUFFER: usize = 1000;

/// Table-scoped publish/subscribe registry.
///
/// Delivery is synchronous and follows registration order. Nothing is
/// buffered for late subscribers.
pub struct EventBus {
    /// Active subscriptions in registration order.
    listeners: Arc<Registry>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` for changes on `table`.
    pub fn subscribe<F>(&self, table: &str, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let callback: ChangeCallback = Arc::new(callback);
        self.register(table, Sink::Callback(callback))
    }

    /// Register a channel subscriber for `table` with the default buffer.
    pub fn subscribe_channel(&self, table: &str) -> ChannelSubscription {
        self.subscribe_channel_with_buffer(table, DEFAULT_CHANNEL_BUFFER)
    }

    /// Register a channel subscriber holding at most `buffer_size` undelivered events.
    pub fn subscribe_channel_with_buffer(
        &self,
        table: &str,
        buffer_size: usize,
    ) -> ChannelSubscription {
        let (sender, receiver) = bounded(buffer_size.max(1));
        let subscription = self.register(table, Sink::Channel(sender));
        ChannelSubscription {
            subscription,
            receiver,
        }
    }

    fn register(&self, table: &str, sink: Sink) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push(Listener {
            id,
            table: table.to_string(),
            sink,
        });
        debug!(table, subscription = id.0, "subscribed");
        Subscription::new(id, table.to_string(), &self.listeners)
    }

    /// Remove a subscription by id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Number of active subscriptions on `table`.
    pub fn subscriber_count(&self, table: &str) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|l| l.table == table)
            .count()
    }

    /// Total number of active subscriptions.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Build and publish a change event.
    pub fn publish_change(
        &self,
        table: &str,
        event_type: ChangeKind,
        old: Option<Row>,
        new: Option<Row>,
    ) -> usize {
        self.publish(ChangeEvent {
            table: table.to_string(),
            event_type,
            old,
            new,
        })
    }

    /// Deliver `event` to every subscriber of its table.
    ///
    /// Listeners run outside the registry lock, so they may subscribe,
    /// unsubscribe or mutate the engine. A panicking callback is logged and
    /// skipped. Returns the number of successful deliveries.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.table == event.table)
            .cloned()
            .collect();

        let mut delivered = 0;
        let mut to_remove = Vec::new();

        for listener in targets {
            match listener.sink {
                Sink::Callback(callback) => {
                    if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_ok() {
                        delivered += 1;
                    } else {
                        warn!(
                            table = %event.table,
                            event = %event.event_type,
                            subscription = listener.id.0,
                            "change listener panicked"
                        );
                    }
                }
                Sink::Channel(sender) => {
                    if sender.try_send(event.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        to_remove.push(listener.id);
                    }
                }
            }
        }

        // Remove full or disconnected channel subscribers
        if !to_remove.is_empty() {
            warn!(
                table = %event.table,
                dropped = to_remove.len(),
                "dropping channel subscribers that stopped draining"
            );
            self.listeners.write().retain(|l| !to_remove.contains(&l.id));
        }

        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
