//! Integration tests for the table engine.

use localbase::{ChangeEvent, ChangeKind, Database, DatabaseConfig, Order, OrderStatus};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

fn empty_db() -> Database {
    Database::in_memory_with(DatabaseConfig {
        seed: false,
        ..Default::default()
    })
}

fn ids(db: &Database, table: &str) -> Vec<Value> {
    db.from(table)
        .execute()
        .rows()
        .into_iter()
        .map(|r| r["id"].clone())
        .collect()
}

// --- Id Assignment ---

#[test]
fn test_ids_are_assigned_and_never_reused() {
    let db = empty_db();

    let first = db
        .from("orders")
        .insert(json!({"user_id": "u1", "amount": 10, "status": "pending"}))
        .execute();
    assert_eq!(first.status, 201);
    assert_eq!(first.data.as_ref().unwrap()["id"], 1);

    let second = db
        .from("orders")
        .insert(json!({"user_id": "u1", "amount": 5, "status": "pending"}))
        .execute();
    assert_eq!(second.data.as_ref().unwrap()["id"], 2);

    let deleted = db.from("orders").delete().eq("id", 1).execute();
    assert_eq!(deleted.status, 204);
    assert_eq!(deleted.count, Some(1));
    assert_eq!(ids(&db, "orders"), vec![json!(2)]);

    let third = db
        .from("orders")
        .insert(json!({"user_id": "u1", "amount": 1, "status": "pending"}))
        .execute();
    assert_eq!(third.data.as_ref().unwrap()["id"], 3);
}

#[test]
fn test_explicit_id_and_timestamp_are_kept() {
    let db = empty_db();
    let resp = db
        .from("notes")
        .insert(json!({"id": 40, "created_at": "2020-01-01T00:00:00.000Z"}))
        .execute();
    let row = resp.data.unwrap();
    assert_eq!(row["id"], 40);
    assert_eq!(row["created_at"], "2020-01-01T00:00:00.000Z");

    let next = db.from("notes").insert(json!({})).execute().data.unwrap();
    assert_eq!(next["id"], 41);
    assert!(next["created_at"].as_str().is_some_and(|s| s.ends_with('Z')));
}

#[test]
fn test_bulk_insert_returns_every_row() {
    let db = empty_db();
    let resp = db
        .from("notes")
        .insert(json!([{"body": "a"}, {"body": "b"}, {"body": "c"}]))
        .execute();

    let rows = resp.rows();
    assert_eq!(rows.len(), 3);
    let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
}

// --- Select ---

#[test]
fn test_filters_sort_and_limit() {
    let db = Database::in_memory();

    let resp = db
        .from("orders")
        .neq("status", "completed")
        .order("amount", false)
        .execute();
    let amounts: Vec<_> = resp.rows().iter().map(|r| r["amount"].clone()).collect();
    assert_eq!(amounts, vec![json!(25.0), json!(7.5)]);
    assert_eq!(resp.count, Some(2));

    let top = db.from("orders").order("id", true).limit(1).execute();
    assert_eq!(top.rows()[0]["id"], 1001);

    let cheap = db
        .from("orders")
        .gte("amount", 7.5)
        .lt("amount", 20)
        .in_("status", ["processing", "pending"])
        .execute();
    assert_eq!(cheap.rows().len(), 1);
    assert_eq!(cheap.rows()[0]["id"], 1002);
}

#[test]
fn test_single_returns_first_row_or_null() {
    let db = Database::in_memory();

    let found = db.from("profiles").eq("id", "user-123").single().execute();
    assert!(found.is_ok());
    assert_eq!(found.data.unwrap()["email"], "user@example.com");

    let missing = db.from("profiles").eq("id", "nobody").maybe_single().execute();
    assert!(missing.is_ok());
    assert!(missing.data.is_none());

    // Zero rows is not an error for single() either
    let strict = db.from("profiles").eq("id", "nobody").single().execute();
    assert!(strict.error.is_none());
}

#[test]
fn test_join_embeds_related_row() {
    let db = Database::in_memory();

    let resp = db
        .from("orders")
        .select("id, status, service:services(id, name)")
        .eq("id", 1003)
        .single()
        .execute();
    let row = resp.data.unwrap();
    assert_eq!(row["service"]["name"], "YouTube Views");
    assert!(row["service"].get("price_per_1000").is_none());
    assert!(row.get("amount").is_none());

    let services = db
        .from("services")
        .select("*, category:categories(*)")
        .order("id", true)
        .execute();
    assert_eq!(services.rows()[0]["category"]["slug"], "instagram");
}

#[test]
fn test_join_with_dangling_key_attaches_null() {
    let db = Database::in_memory();
    db.from("orders")
        .insert(json!({"id": 5000, "user_id": "user-123", "service_id": 99, "status": "pending"}))
        .execute();

    let row = db
        .from("orders")
        .select("*, service:services(*)")
        .eq("id", 5000)
        .single()
        .execute()
        .data
        .unwrap();
    assert_eq!(row["service"], Value::Null);
}

#[test]
fn test_typed_decode_of_select() {
    let db = Database::in_memory();
    let orders: Vec<Order> = db
        .from("orders")
        .order("id", true)
        .execute()
        .decode()
        .unwrap()
        .unwrap();
    assert_eq!(orders.len(), 3);
    assert_eq!(orders[0].status, OrderStatus::Completed);
    assert_eq!(orders[2].amount, 25.0);
}

// --- Update ---

#[test]
fn test_update_touches_only_matching_rows() {
    let db = Database::in_memory();
    let before = db.from("orders").order("id", true).execute().rows();

    let resp = db
        .from("orders")
        .update(json!({"status": "completed"}))
        .eq("id", 1003)
        .execute();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.count, Some(1));
    assert!(resp.data.is_none());

    let after = db.from("orders").order("id", true).execute().rows();
    assert_eq!(before[0], after[0]);
    assert_eq!(before[1], after[1]);
    assert_eq!(after[2]["status"], "completed");
    assert!(after[2]["updated_at"].is_string());
}

#[test]
fn test_update_with_projection_returns_rows() {
    let db = Database::in_memory();
    let resp = db
        .from("profiles")
        .update(json!({"balance": 1}))
        .eq("id", "user-123")
        .select("id, balance")
        .execute();

    let rows = resp.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["balance"], 1);
    assert!(rows[0].get("email").is_none());
}

#[test]
fn test_update_matching_nothing_changes_nothing() {
    let db = Database::in_memory();
    let events = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&events);
    let _sub = db.subscribe("orders", move |_| *counter.lock() += 1);

    let resp = db
        .from("orders")
        .update(json!({"status": "x"}))
        .eq("id", 424242)
        .execute();
    assert!(resp.is_ok());
    assert_eq!(resp.count, Some(0));
    assert_eq!(*events.lock(), 0);
}

// --- Events ---

#[test]
fn test_n_inserts_yield_n_insert_events() {
    let db = empty_db();
    let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = db.subscribe("orders", move |e| sink.lock().push(e.clone()));

    let mut inserted = Vec::new();
    for i in 0..5 {
        let resp = db
            .from("orders")
            .insert(json!({"user_id": "u1", "amount": i}))
            .execute();
        inserted.push(resp.data.unwrap());
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 5);
    for (event, row) in seen.iter().zip(&inserted) {
        assert_eq!(event.event_type, ChangeKind::Insert);
        assert!(event.old.is_none());
        assert_eq!(event.new.clone().map(Value::Object).as_ref(), Some(row));
    }
}

#[test]
fn test_update_event_carries_no_previous_row() {
    // Update notifications publish `old = null` rather than the pre-update
    // row. Consumers diffing against `old` see nothing; this asserts the
    // current behaviour so any change to it is deliberate.
    let db = Database::in_memory();
    let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = db.subscribe("profiles", move |e| sink.lock().push(e.clone()));

    db.from("profiles")
        .update(json!({"balance": 50}))
        .eq("id", "user-123")
        .execute();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, ChangeKind::Update);
    assert!(seen[0].old.is_none());
    assert_eq!(seen[0].new.as_ref().unwrap()["balance"], 50);
}

#[test]
fn test_delete_emits_one_table_event() {
    let db = Database::in_memory();
    let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = db.subscribe("orders", move |e| sink.lock().push(e.clone()));

    let resp = db.from("orders").delete().eq("user_id", "user-123").execute();
    assert_eq!(resp.count, Some(3));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, ChangeKind::Delete);
    assert!(seen[0].old.is_none() && seen[0].new.is_none());
}

#[test]
fn test_listener_failure_does_not_fail_mutation() {
    let db = empty_db();
    let _sub = db.subscribe("notes", |_| panic!("listener bug"));

    let resp = db.from("notes").insert(json!({"body": "x"})).execute();
    assert!(resp.is_ok());
    assert_eq!(db.from("notes").execute().rows().len(), 1);
}

#[test]
fn test_listener_may_query_the_database() {
    let db = Arc::new(empty_db());
    let counts = Arc::new(Mutex::new(Vec::new()));

    let inner_db = Arc::clone(&db);
    let sink = Arc::clone(&counts);
    let _sub = db.subscribe("notes", move |_| {
        let n = inner_db.from("notes").execute().rows().len();
        sink.lock().push(n);
    });

    db.from("notes").insert(json!({"body": "one"})).execute();
    db.from("notes").insert(json!({"body": "two"})).execute();
    assert_eq!(*counts.lock(), vec![1, 2]);
}

#[test]
fn test_channel_subscription_receives_changes() {
    let db = empty_db();
    let sub = db.subscribe_channel("notes");

    db.from("notes").insert(json!({"body": "a"})).execute();
    db.from("notes").update(json!({"body": "b"})).eq("id", 1).execute();
    db.from("notes").delete().eq("id", 1).execute();

    let kinds: Vec<_> = sub.drain().into_iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
    );
}

// --- Mutations Are Exclusive ---

#[test]
fn test_last_mutation_setter_wins() {
    let db = Database::in_memory();
    let resp = db
        .from("orders")
        .insert(json!({"user_id": "x"}))
        .delete()
        .eq("id", 1001)
        .execute();
    assert_eq!(resp.status, 204);
    assert_eq!(db.from("orders").execute().rows().len(), 2);
}
