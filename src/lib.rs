//! # Localbase
//!
//! An embedded, persistent, reactive table engine that stands in for a
//! hosted PostgREST-style backend.
//!
//! ## Core Concepts
//!
//! - **Tables**: named, ordered sequences of JSON rows, written through to a
//!   key-value store on every mutation
//! - **Queries**: a chainable builder with filters, ordering, limits,
//!   column projection, one-level joins and a single mutation
//! - **Events**: INSERT/UPDATE/DELETE notifications delivered synchronously
//!   to table subscribers
//! - **Auth**: one persisted session slot with a single state listener
//! - **RPC**: named procedures that update several tables as one unit
//!
//! ## Example
//!
//! ```ignore
//! use localbase::Database;
//! use serde_json::json;
//!
//! let db = Database::in_memory();
//!
//! let sub = db.subscribe("orders", |event| {
//!     println!("{} {:?}", event.event_type, event.new);
//! });
//!
//! let created = db
//!     .from("orders")
//!     .insert(json!({"user_id": "user-123", "amount": 10, "status": "pending"}))
//!     .execute();
//!
//! let pending = db
//!     .from("orders")
//!     .select("*, service:services(id, name)")
//!     .eq("status", "pending")
//!     .order("created_at", false)
//!     .execute();
//!
//! let refund = db.rpc("refund_order", json!({"order_id": 1003}));
//! sub.unsubscribe();
//! ```

pub mod auth;
pub mod database;
pub mod error;
pub mod query;
pub mod rpc;
pub mod schema;
pub mod seed;
pub mod storage;
pub mod subscriptions;
pub mod tables;
pub mod types;

// Re-exports
pub use auth::{
    Auth, AuthData, AuthEvent, AuthSubscription, NewUser, Session, SessionData, SessionManager,
    UserAttributes, UserData,
};
pub use database::{Database, DatabaseConfig, DatabaseStats};
pub use error::{ApiError, ErrorKind, Result, StoreError};
pub use query::{Cardinality, FilterOp, Projection, QueryBuilder};
pub use rpc::{Procedure, RpcDispatcher};
pub use schema::{
    AppRole, Category, KnownTable, Order, OrderStatus, Profile, Service, ServiceType, TableRecord,
    Transaction, TransactionType, UserRole,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use subscriptions::{ChannelSubscription, EventBus, Subscription, SubscriptionId};
pub use tables::TableStore;
pub use types::*;
