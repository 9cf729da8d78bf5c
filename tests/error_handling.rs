//! Error handling and edge case tests.

use localbase::{
    ApiError, Database, DatabaseConfig, ErrorKind, KeyValueStorage, MemoryStorage, Response,
    StoreError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Storage whose writes can be switched off.
struct FlakyStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
}

impl FlakyStorage {
    fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            failing: AtomicBool::new(false),
        }
    }
}

impl KeyValueStorage for FlakyStorage {
    fn get(&self, key: &str) -> localbase::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> localbase::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidOperation("disk full".to_string()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> localbase::Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> localbase::Result<Vec<String>> {
        self.inner.keys()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn kind<T>(resp: &Response<T>) -> Option<ErrorKind> {
    resp.error.as_ref().map(|e| e.kind)
}

// --- Query Errors ---

#[test]
fn test_empty_table_name_is_rejected() {
    let db = Database::in_memory();
    let resp = db.from("").execute();
    assert_eq!(kind(&resp), Some(ErrorKind::InvalidInput));
    assert!(resp.data.is_none());
}

#[test]
fn test_malformed_select_list() {
    let db = Database::in_memory();
    let resp = db
        .from("orders")
        .select("*, service:services(id")
        .execute();
    assert_eq!(kind(&resp), Some(ErrorKind::InvalidInput));
    assert_eq!(resp.status, 400);
}

#[test]
fn test_insert_rejects_non_objects() {
    let db = Database::in_memory();
    assert_eq!(
        kind(&db.from("notes").insert(json!(42)).execute()),
        Some(ErrorKind::InvalidInput)
    );
    assert_eq!(
        kind(&db.from("notes").insert(json!([{"a": 1}, "b"])).execute()),
        Some(ErrorKind::InvalidInput)
    );
    // Nothing was written by the partially valid batch
    assert!(db.from("notes").execute().rows().is_empty());
}

#[test]
fn test_update_rejects_non_object_patch() {
    let db = Database::in_memory();
    let resp = db.from("orders").update(json!([1, 2])).execute();
    assert_eq!(kind(&resp), Some(ErrorKind::InvalidInput));
}

#[test]
fn test_empty_bulk_insert_is_a_no_op() {
    let db = Database::in_memory();
    let resp = db.from("notes").insert(json!([])).execute();
    assert!(resp.is_ok());
    assert_eq!(resp.data, Some(json!([])));
}

#[test]
fn test_unknown_table_selects_empty() {
    let db = Database::in_memory();
    let resp = db.from("nothing_here").execute();
    assert!(resp.is_ok());
    assert_eq!(resp.data, Some(json!([])));
    assert_eq!(resp.count, Some(0));
}

#[test]
fn test_into_result_bridges_to_question_mark() {
    fn balance(db: &Database) -> Result<Value, ApiError> {
        let row = db
            .from("profiles")
            .select("balance")
            .eq("id", "user-123")
            .single()
            .execute()
            .into_result()?;
        Ok(row.map(|r| r["balance"].clone()).unwrap_or(Value::Null))
    }

    let db = Database::in_memory();
    assert_eq!(balance(&db).unwrap(), json!(100.0));
}

// --- Persistence Failures ---

#[test]
fn test_failed_write_reports_internal_error_without_events() {
    init_tracing();
    let storage = Arc::new(FlakyStorage::new());
    let db = Database::open(DatabaseConfig::default(), storage.clone()).unwrap();
    let sub = db.subscribe_channel("notes");

    storage.failing.store(true, Ordering::SeqCst);
    let resp = db.from("notes").insert(json!({"body": "lost"})).execute();

    assert_eq!(kind(&resp), Some(ErrorKind::Internal));
    assert_eq!(resp.status, 500);
    assert!(sub.try_recv().is_err());
}

#[test]
fn test_failed_refund_write_emits_nothing() {
    init_tracing();
    let storage = Arc::new(FlakyStorage::new());
    let db = Database::open(DatabaseConfig::default(), storage.clone()).unwrap();
    let orders = db.subscribe_channel("orders");

    storage.failing.store(true, Ordering::SeqCst);
    let resp = db.rpc("refund_order", json!({"order_id": 1003}));

    assert_eq!(kind(&resp), Some(ErrorKind::Internal));
    assert!(orders.try_recv().is_err());
}

#[test]
fn test_malformed_persisted_table_loads_empty() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new());
    storage.set("localbase_orders", "{not json").unwrap();
    storage.set("localbase_notes", "{\"not\": \"an array\"}").unwrap();

    let db = Database::open(
        DatabaseConfig {
            seed: false,
            ..Default::default()
        },
        storage,
    )
    .unwrap();
    assert!(db.from("orders").execute().rows().is_empty());
    assert!(db.from("notes").execute().rows().is_empty());
}

#[test]
fn test_malformed_table_is_reseeded() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set("localbase_categories", "garbage").unwrap();

    let db = Database::open(DatabaseConfig::default(), storage).unwrap();
    assert_eq!(db.from("categories").execute().rows().len(), 3);
}
