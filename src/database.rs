//! The engine instance tying tables, events, sessions and procedures together.

use crate::auth::{Auth, SessionManager};
use crate::error::Result;
use crate::query::QueryBuilder;
use crate::rpc::RpcDispatcher;
use crate::seed;
use crate::storage::{FileStorage, KeyValueStorage, MemoryStorage};
use crate::subscriptions::{ChannelSubscription, EventBus, Subscription};
use crate::tables::TableStore;
use crate::types::{ChangeEvent, Response};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Database configuration.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// Prefix of every table's storage key.
    pub storage_prefix: String,

    /// Storage key of the session slot.
    pub session_key: String,

    /// Storage key of the per-table id high-water marks.
    pub id_marks_key: String,

    /// Install the seed catalogue into empty tables on open.
    pub seed: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            storage_prefix: "localbase_".to_string(),
            session_key: "localbase-session".to_string(),
            id_marks_key: "localbase-ids".to_string(),
            seed: true,
        }
    }
}

/// Counters describing an open database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub table_count: usize,
    pub row_count: usize,
    pub subscriber_count: usize,
    pub procedure_count: usize,
    pub signed_in: bool,
}

/// The data engine.
///
/// Construct one per application and hand out references; every query,
/// auth call and procedure runs against it.
pub struct Database {
    /// Database configuration.
    config: DatabaseConfig,

    /// Tables and their persistence.
    tables: TableStore,

    /// Change notifications.
    events: EventBus,

    /// Session slot and auth listener.
    sessions: SessionManager,

    /// Named procedures.
    rpc: RpcDispatcher,

    /// Serializes mutations so no caller observes a half-applied write.
    write_lock: Mutex<()>,
}

impl Database {
    /// Open a database over `storage`, loading persisted tables and seeding
    /// empty ones when configured.
    pub fn open(config: DatabaseConfig, storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        let db = Self::assemble(config, storage);
        let loaded = db.tables.load()?;
        if db.config.seed {
            seed::apply(&db.tables)?;
        }
        info!(
            tables = loaded,
            prefix = %db.config.storage_prefix,
            "database opened"
        );
        Ok(db)
    }

    /// Seeded database backed by process memory.
    pub fn in_memory() -> Self {
        Self::in_memory_with(DatabaseConfig::default())
    }

    /// Database backed by process memory with explicit configuration.
    pub fn in_memory_with(config: DatabaseConfig) -> Self {
        let db = Self::assemble(config, Arc::new(MemoryStorage::new()));
        if db.config.seed {
            if let Err(e) = seed::apply(&db.tables) {
                warn!(error = %e, "failed to seed in-memory database");
            }
        }
        db
    }

    /// Open (or create) a file-backed database in directory `path`.
    pub fn open_dir(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_dir_with(path, DatabaseConfig::default())
    }

    pub fn open_dir_with(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let storage = FileStorage::open(path)?;
        Self::open(config, Arc::new(storage))
    }

    fn assemble(config: DatabaseConfig, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            tables: TableStore::new(Arc::clone(&storage), config.storage_prefix.clone())
                .with_id_marks(config.id_marks_key.clone()),
            sessions: SessionManager::new(storage, config.session_key.clone()),
            events: EventBus::new(),
            rpc: RpcDispatcher::with_builtins(),
            write_lock: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // --- Queries ---

    /// Start a query against `table`.
    pub fn from(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, table)
    }

    // --- Auth ---

    pub fn auth(&self) -> Auth<'_> {
        Auth::new(self)
    }

    // --- Procedures ---

    /// Call the procedure registered as `name`.
    pub fn rpc(&self, name: &str, params: Value) -> Response<Value> {
        self.rpc.call(self, name, &params)
    }

    /// The procedure registry, for registering custom procedures.
    pub fn procedures(&self) -> &RpcDispatcher {
        &self.rpc
    }

    // --- Subscriptions ---

    /// Register `callback` for every change on `table`.
    pub fn subscribe<F>(&self, table: &str, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(table, callback)
    }

    /// Receive changes on `table` through a bounded channel.
    pub fn subscribe_channel(&self, table: &str) -> ChannelSubscription {
        self.events.subscribe_channel(table)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- Internals ---

    pub fn tables(&self) -> &TableStore {
        &self.tables
    }

    pub(crate) fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub(crate) fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    // --- Statistics ---

    pub fn stats(&self) -> DatabaseStats {
        let names = self.tables.table_names();
        DatabaseStats {
            row_count: names.iter().map(|t| self.tables.len(t)).sum(),
            table_count: names.len(),
            subscriber_count: self.events.len(),
            procedure_count: self.rpc.names().len(),
            signed_in: self.sessions.is_signed_in(),
        }
    }
}
