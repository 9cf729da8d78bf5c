//! File-backed persistence tests.

use localbase::{Database, DatabaseConfig, FileStorage, KeyValueStorage, StoreError};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_one_file_per_table() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open_dir(dir.path()).unwrap();
        db.from("notes").insert(json!({"body": "hi"})).execute();
    }

    for table in ["categories", "services", "profiles", "orders", "user_roles", "notes"] {
        let path = dir.path().join(format!("localbase_{}.json", table));
        assert!(path.exists(), "missing {}", path.display());
    }

    let raw = std::fs::read_to_string(dir.path().join("localbase_notes.json")).unwrap();
    let rows: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(rows[0]["body"], "hi");
}

#[test]
fn test_mutations_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open_dir(dir.path()).unwrap();
        db.from("orders")
            .update(json!({"status": "completed"}))
            .eq("id", 1002)
            .execute();
        db.from("categories").delete().eq("slug", "tiktok").execute();
        assert!(db.rpc("refund_order", json!({"order_id": 1003})).is_ok());
    }

    let db = Database::open_dir(dir.path()).unwrap();
    let order = db.from("orders").eq("id", 1002).single().execute();
    assert_eq!(order.data.unwrap()["status"], "completed");
    assert_eq!(db.from("categories").execute().rows().len(), 2);
    let profile = db.from("profiles").eq("id", "user-123").single().execute();
    assert_eq!(profile.data.unwrap()["balance"], 125.0);
    assert_eq!(db.from("transactions").execute().rows().len(), 1);
}

#[test]
fn test_session_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let token = {
        let db = Database::open_dir(dir.path()).unwrap();
        let resp = db.auth().sign_in("user@example.com", "pw");
        resp.data.unwrap().session.unwrap().access_token
    };

    let db = Database::open_dir(dir.path()).unwrap();
    let session = db.auth().get_session().data.unwrap().session.unwrap();
    assert_eq!(session.access_token, token);
    assert!(db.stats().signed_in);
    // The session slot is not mistaken for a table
    assert!(!db.tables().table_names().iter().any(|t| t.contains("session")));
}

#[test]
fn test_ids_continue_after_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open_dir(dir.path()).unwrap();
        db.from("notes").insert(json!([{}, {}])).execute();
    }
    let db = Database::open_dir(dir.path()).unwrap();
    let row = db.from("notes").insert(json!({})).execute().data.unwrap();
    assert_eq!(row["id"], 3);
}

#[test]
fn test_deleted_ids_stay_retired_after_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open_dir(dir.path()).unwrap();
        db.from("notes").insert(json!([{}, {}])).execute();
        db.from("notes").delete().eq("id", 2).execute();
        let row = db.from("notes").insert(json!({})).execute().data.unwrap();
        assert_eq!(row["id"], 3);
        db.from("notes").delete().eq("id", 3).execute();
    }

    let db = Database::open_dir(dir.path()).unwrap();
    let row = db.from("notes").insert(json!({})).execute().data.unwrap();
    assert_eq!(row["id"], 4);
    // The marks entry is not loaded as a table
    assert!(!db.tables().table_names().iter().any(|t| t.contains("ids")));
}

#[test]
fn test_custom_prefix_isolates_tables() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());

    let db = Database::open(
        DatabaseConfig {
            storage_prefix: "shop_".to_string(),
            session_key: "shop-session".to_string(),
            id_marks_key: "shop-ids".to_string(),
            seed: false,
        },
        storage.clone(),
    )
    .unwrap();
    db.from("notes").insert(json!({"body": "x"})).execute();

    let mut keys = storage.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["shop-ids".to_string(), "shop_notes".to_string()]);
}

#[test]
fn test_directory_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let _first = Database::open_dir(dir.path()).unwrap();
    assert!(matches!(
        Database::open_dir(dir.path()),
        Err(StoreError::Locked)
    ));
}
