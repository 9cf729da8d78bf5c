//! Row-level change notifications.
//!
//! After every successful mutation the engine publishes a [`ChangeEvent`]
//! to the subscribers of the affected table:
//! - callbacks run synchronously, in registration order
//! - channel subscribers receive a clone and are dropped if they stop draining
//!
//! There is no replay: a subscriber only sees events published after it
//! registered.
//!
//! # Example
//!
//! ```ignore
//! let sub = db.subscribe("orders", |event| {
//!     println!("{} on {}", event.event_type, event.table);
//! });
//! db.from("orders").insert(json!({"user_id": "u1", "amount": 10})).execute();
//! sub.unsubscribe();
//! ```
//!
//! [`ChangeEvent`]: crate::types::ChangeEvent

mod manager;
mod types;

pub use manager::{EventBus, DEFAULT_CHANNEL_BUFFER};
pub use types::{ChangeCallback, ChannelSubscription, Subscription, SubscriptionId};
