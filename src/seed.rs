//! Initial catalogue, accounts and orders installed into empty tables.

use crate::error::Result;
use crate::schema::KnownTable;
use crate::tables::TableStore;
use crate::types::{Row, Timestamp};
use serde_json::{json, Value};
use tracing::info;

const DAY_MS: i64 = 86_400_000;

/// Seed rows per table, in installation order.
pub fn seed_rows() -> Vec<(KnownTable, Vec<Row>)> {
    let now = Timestamp::now();
    let created = now.to_iso();
    let yesterday = Timestamp(now.0 - DAY_MS).to_iso();
    let half_day_ago = Timestamp(now.0 - DAY_MS / 2).to_iso();

    let categories = json!([
        {"id": 1, "name": "Instagram", "slug": "instagram", "icon": "Instagram", "sort_order": 1, "is_active": true, "created_at": created},
        {"id": 2, "name": "YouTube", "slug": "youtube", "icon": "Youtube", "sort_order": 2, "is_active": true, "created_at": created},
        {"id": 3, "name": "TikTok", "slug": "tiktok", "icon": "Video", "sort_order": 3, "is_active": true, "created_at": created},
    ]);

    let services = json!([
        {
            "id": 1,
            "name": "Instagram Followers (Real)",
            "type": "smm",
            "category_id": 1,
            "price_per_1000": 5.0,
            "min_quantity": 1,
            "max_quantity": 10000,
            "description": "High quality real followers",
            "is_active": true,
            "input_schema": ["link", "quantity"],
            "created_at": created
        },
        {
            "id": 2,
            "name": "YouTube Views",
            "type": "smm",
            "category_id": 2,
            "price_per_1000": 2.5,
            "min_quantity": 1,
            "max_quantity": 50000,
            "description": "Fast retention views",
            "is_active": true,
            "input_schema": ["link", "quantity"],
            "created_at": created
        }
    ]);

    let profiles = json!([
        {"id": "user-123", "email": "user@example.com", "role": "user", "balance": 100.0, "is_active": true, "created_at": created},
        {"id": "admin-123", "email": "admin@example.com", "role": "admin", "balance": 9999.99, "is_active": true, "created_at": created},
    ]);

    let user_roles = json!([
        {"id": "role-1", "user_id": "user-123", "role": "user", "created_at": created},
        {"id": "role-2", "user_id": "admin-123", "role": "admin", "created_at": created},
    ]);

    let orders = json!([
        {
            "id": 1001,
            "user_id": "user-123",
            "service_id": 1,
            "status": "completed",
            "amount": 15.0,
            "link": "https://instagram.com/p/123",
            "quantity": 1000,
            "created_at": yesterday,
            "updated_at": yesterday,
            "fulfillment_data": {"text": "<p>Order <b>completed</b> successfully!</p>", "files": []}
        },
        {
            "id": 1002,
            "user_id": "user-123",
            "service_id": 1,
            "status": "processing",
            "amount": 7.5,
            "link": "https://instagram.com/p/456",
            "quantity": 500,
            "created_at": half_day_ago,
            "updated_at": half_day_ago
        },
        {
            "id": 1003,
            "user_id": "user-123",
            "service_id": 2,
            "status": "pending",
            "amount": 25.0,
            "link": "https://youtube.com/watch?v=xyz",
            "quantity": 2000,
            "created_at": created,
            "updated_at": created
        }
    ]);

    vec![
        (KnownTable::Categories, rows(categories)),
        (KnownTable::Services, rows(services)),
        (KnownTable::Profiles, rows(profiles)),
        (KnownTable::Orders, rows(orders)),
        (KnownTable::UserRoles, rows(user_roles)),
    ]
}

/// Seed every known table that is still empty. Returns how many were seeded.
pub fn apply(tables: &TableStore) -> Result<usize> {
    let mut seeded = 0;
    for (table, rows) in seed_rows() {
        if tables.seed(table.name(), rows)? {
            seeded += 1;
        }
    }
    if seeded > 0 {
        info!(tables = seeded, "seeded initial data");
    }
    Ok(seeded)
}

fn rows(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
