//! In-memory table map with write-through persistence.

use crate::error::Result;
use crate::storage::KeyValueStorage;
use crate::types::Row;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Process-wide map of table name to ordered rows.
///
/// Tables are created empty on first reference and written back to storage
/// in full whenever they are replaced.
pub struct TableStore {
    /// Durable backend.
    storage: Arc<dyn KeyValueStorage>,

    /// Key prefix for table entries.
    prefix: String,

    /// Rows by table name, in insertion order.
    tables: RwLock<HashMap<String, Vec<Row>>>,

    /// Highest auto-assigned id per table. Keeps ids from being handed out
    /// again after the row holding the maximum is deleted.
    id_marks: RwLock<HashMap<String, i64>>,

    /// Storage key holding `id_marks`. Marks stay in memory when unset.
    marks_key: Option<String>,

    /// Set when a mark moved since it was last written.
    marks_dirty: AtomicBool,
}

impl TableStore {
    /// Create a store over `storage` without loading anything.
    pub fn new(storage: Arc<dyn KeyValueStorage>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            tables: RwLock::new(HashMap::new()),
            id_marks: RwLock::new(HashMap::new()),
            marks_key: None,
            marks_dirty: AtomicBool::new(false),
        }
    }

    /// Persist id high-water marks under `key`, so deleted ids stay retired
    /// across reopen. `key` must not start with the table prefix.
    pub fn with_id_marks(mut self, key: impl Into<String>) -> Self {
        self.marks_key = Some(key.into());
        self
    }

    /// Load every persisted table. Returns the number of tables loaded.
    ///
    /// Entries that fail to parse come back as empty tables.
    pub fn load(&self) -> Result<usize> {
        let mut loaded = HashMap::new();
        for key in self.storage.keys()? {
            if self.marks_key.as_deref() == Some(key.as_str()) {
                continue;
            }
            let Some(table) = key.strip_prefix(&self.prefix) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            loaded.insert(table.to_string(), self.read_persisted(table));
        }

        let count = loaded.len();
        debug!(tables = count, prefix = %self.prefix, "loaded persisted tables");
        *self.tables.write() = loaded;
        *self.id_marks.write() = self.read_marks();
        Ok(count)
    }

    /// Storage key for a table.
    pub fn storage_key(&self, table: &str) -> String {
        format!("{}{}", self.prefix, table)
    }

    /// Backend this store writes through to.
    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.storage
    }

    /// Current rows of `table`, materialising it empty if unseen.
    pub fn snapshot(&self, table: &str) -> Vec<Row> {
        if let Some(rows) = self.tables.read().get(table) {
            return rows.clone();
        }
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .clone()
    }

    /// Number of rows in `table` (0 for unseen tables).
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// Names of every materialised table, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Replace the full row sequence of `table`, then persist it.
    ///
    /// The in-memory table is updated before the write, so a failed write
    /// still leaves readers observing the new rows.
    pub fn replace(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let encoded = serde_json::to_string(&rows)?;
        self.tables.write().insert(table.to_string(), rows);
        self.persist_marks()?;
        self.storage.set(&self.storage_key(table), &encoded)
    }

    /// Replace several tables at once.
    ///
    /// Memory is updated for every table under one write lock, so readers
    /// never observe a partial batch. Each table is then persisted; the
    /// first write error is returned after all writes were attempted.
    pub fn replace_all(&self, batch: Vec<(String, Vec<Row>)>) -> Result<()> {
        let mut encoded = Vec::with_capacity(batch.len());
        for (table, rows) in &batch {
            encoded.push((self.storage_key(table), serde_json::to_string(rows)?));
        }

        {
            let mut tables = self.tables.write();
            for (table, rows) in batch {
                tables.insert(table, rows);
            }
        }

        let mut first_error = self.persist_marks().err();
        for (key, value) in encoded {
            if let Err(e) = self.storage.set(&key, &value) {
                warn!(key = %key, error = %e, "failed to persist table");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Install `rows` only if `table` is currently empty. Returns whether it seeded.
    pub fn seed(&self, table: &str, rows: Vec<Row>) -> Result<bool> {
        if self.len(table) > 0 {
            return Ok(false);
        }
        debug!(table, rows = rows.len(), "seeding table");
        self.replace(table, rows)?;
        Ok(true)
    }

    /// Rows of `table` as they currently sit in storage.
    pub fn persisted_snapshot(&self, table: &str) -> Vec<Row> {
        self.read_persisted(table)
    }

    /// Reserve the next auto-increment id for `table`.
    ///
    /// The id is one more than the larger of the highest numeric id in
    /// `rows` (0 when none) and the highest id previously reserved. The
    /// mark is written with the next `replace` or `replace_all`.
    pub fn reserve_id(&self, table: &str, rows: &[Row]) -> i64 {
        let current_max = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(numeric_id))
            .fold(0, i64::max);

        let mut marks = self.id_marks.write();
        let mark = marks.entry(table.to_string()).or_insert(0);
        let next = current_max.max(*mark) + 1;
        *mark = next;
        self.marks_dirty.store(true, Ordering::SeqCst);
        next
    }

    /// Write the id marks if any moved. Runs before the table write, so a
    /// persisted row never carries an id above its persisted mark.
    fn persist_marks(&self) -> Result<()> {
        let Some(key) = &self.marks_key else {
            return Ok(());
        };
        if !self.marks_dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let encoded = serde_json::to_string(&*self.id_marks.read())?;
        if let Err(e) = self.storage.set(key, &encoded) {
            self.marks_dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    fn read_marks(&self) -> HashMap<String, i64> {
        let Some(key) = &self.marks_key else {
            return HashMap::new();
        };
        match self.storage.get(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "malformed id marks, rebuilding from rows");
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read id marks, rebuilding from rows");
                HashMap::new()
            }
        }
    }

    fn read_persisted(&self, table: &str) -> Vec<Row> {
        let key = self.storage_key(table);
        let raw = match self.storage.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(table, error = %e, "failed to read persisted table, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(values) => values
                .into_iter()
                .filter_map(|value| match value {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
            Err(e) => {
                warn!(table, error = %e, "malformed persisted table, treating as empty");
                Vec::new()
            }
        }
    }
}

/// Numeric value of an `id` column, if it is a number.
fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn test_store() -> (Arc<MemoryStorage>, TableStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TableStore::new(storage.clone(), "lb_");
        (storage, store)
    }

    #[test]
    fn test_unseen_table_is_empty_and_not_persisted() {
        let (storage, store) = test_store();
        assert!(store.snapshot("orders").is_empty());
        assert_eq!(store.table_names(), vec!["orders".to_string()]);
        assert!(storage.get("lb_orders").unwrap().is_none());
    }

    #[test]
    fn test_replace_writes_through() {
        let (storage, store) = test_store();
        store.replace("orders", vec![row(json!({"id": 1}))]).unwrap();

        assert_eq!(storage.get("lb_orders").unwrap().as_deref(), Some("[{\"id\":1}]"));
        assert_eq!(store.persisted_snapshot("orders").len(), 1);
    }

    #[test]
    fn test_load_recovers_malformed_entries() {
        let (storage, store) = test_store();
        storage.set("lb_orders", "[{\"id\":7}]").unwrap();
        storage.set("lb_broken", "{not json").unwrap();
        storage.set("other_key", "[]").unwrap();

        assert_eq!(store.load().unwrap(), 2);
        assert_eq!(store.snapshot("orders").len(), 1);
        assert!(store.snapshot("broken").is_empty());
    }

    #[test]
    fn test_reserve_id_never_reuses_deleted_max() {
        let (_storage, store) = test_store();
        let rows = vec![row(json!({"id": 1})), row(json!({"id": 2}))];
        assert_eq!(store.reserve_id("orders", &rows), 3);

        // Row 3 was inserted and then deleted: only 1 and 2 remain.
        assert_eq!(store.reserve_id("orders", &rows), 4);
    }

    #[test]
    fn test_id_marks_survive_reload() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TableStore::new(storage.clone(), "lb_").with_id_marks("lb-ids");
        let id = store.reserve_id("orders", &[row(json!({"id": 1}))]);
        assert_eq!(id, 2);
        // Row 2 was deleted before the table was written
        store.replace("orders", vec![row(json!({"id": 1}))]).unwrap();

        let reopened = TableStore::new(storage.clone(), "lb_").with_id_marks("lb-ids");
        assert_eq!(reopened.load().unwrap(), 1);
        assert_eq!(reopened.reserve_id("orders", &reopened.snapshot("orders")), 3);
        assert!(storage.get("lb-ids").unwrap().is_some());
    }

    #[test]
    fn test_id_marks_key_is_not_a_table() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("lb_ids", "{\"orders\":4}").unwrap();
        let store = TableStore::new(storage, "lb_").with_id_marks("lb_ids");
        assert_eq!(store.load().unwrap(), 0);
        assert_eq!(store.reserve_id("orders", &[]), 5);
    }

    #[test]
    fn test_reserve_id_ignores_non_numeric_ids() {
        let (_storage, store) = test_store();
        let rows = vec![row(json!({"id": "role-1"})), row(json!({"id": -5}))];
        assert_eq!(store.reserve_id("user_roles", &rows), 1);
    }

    #[test]
    fn test_replace_all_updates_every_table() {
        let (storage, store) = test_store();
        store
            .replace_all(vec![
                ("orders".to_string(), vec![row(json!({"id": 1}))]),
                ("profiles".to_string(), vec![row(json!({"id": "u"}))]),
            ])
            .unwrap();

        assert_eq!(store.len("orders"), 1);
        assert_eq!(store.len("profiles"), 1);
        assert!(storage.get("lb_profiles").unwrap().is_some());
    }

    #[test]
    fn test_seed_only_when_empty() {
        let (_storage, store) = test_store();
        assert!(store.seed("categories", vec![row(json!({"id": 1}))]).unwrap());
        assert!(!store.seed("categories", vec![row(json!({"id": 9}))]).unwrap());
        assert_eq!(store.snapshot("categories")[0]["id"], 1);
    }
}
