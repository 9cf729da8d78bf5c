//! Built-in procedures.

use crate::auth::AuthEvent;
use crate::database::Database;
use crate::error::ApiError;
use crate::query::{as_number, strict_eq};
use crate::schema::{decode_row, KnownTable, OrderStatus, Profile, TransactionType};
use crate::types::{ChangeEvent, Response, Row, Timestamp};
use serde_json::Value;
use tracing::{error, info, warn};

pub const REFUND_ORDER: &str = "refund_order";
pub const GET_USER_BALANCE: &str = "get_user_balance";
pub const HAS_ROLE: &str = "has_role";

fn param<'p>(params: &'p Value, name: &str) -> Result<&'p Value, ApiError> {
    params
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ApiError::invalid_input(format!("Missing parameter: {}", name)))
}

fn find_by_id<'r>(rows: &'r [Row], id: &Value) -> Option<usize> {
    rows.iter()
        .position(|r| r.get("id").is_some_and(|v| strict_eq(v, id)))
}

/// Cancel an order and credit its amount back to the owner.
///
/// Params: `{ "order_id": <id> }`. Updates `profiles`, `orders` and
/// `transactions` as one unit; on any precondition failure nothing changes.
/// Data on success is `true`.
pub fn refund_order(db: &Database, params: &Value) -> Response<Value> {
    let order_id = match param(params, "order_id") {
        Ok(id) => id.clone(),
        Err(e) => return Response::failure(e),
    };

    let profiles_table = KnownTable::Profiles.name();
    let orders_table = KnownTable::Orders.name();
    let ledger_table = KnownTable::Transactions.name();

    let tables = db.tables();
    let lock = db.write_lock();

    let mut orders = tables.snapshot(orders_table);
    let Some(order_index) = find_by_id(&orders, &order_id) else {
        return Response::failure(ApiError::not_found("Order not found"));
    };
    let previous = orders[order_index].clone();

    let status = previous.get("status").and_then(Value::as_str).unwrap_or_default();
    if OrderStatus::parse(status).is_some_and(OrderStatus::is_cancelled) {
        return Response::failure(
            ApiError::conflict("Order already cancelled").with_details(status.to_string()),
        );
    }

    let Some(user_id) = previous.get("user_id").cloned() else {
        return Response::failure(ApiError::not_found("User not found"));
    };
    let mut profiles = tables.snapshot(profiles_table);
    let Some(user_index) = find_by_id(&profiles, &user_id) else {
        return Response::failure(ApiError::not_found("User not found"));
    };

    let amount = previous
        .get("amount")
        .and_then(as_number)
        .or_else(|| previous.get("total_cost").and_then(as_number))
        .unwrap_or_else(|| {
            warn!(order = %order_id, "order carries no amount, refunding 0");
            0.0
        });
    let balance = profiles[user_index]
        .get("balance")
        .and_then(as_number)
        .unwrap_or(0.0);

    let now = Timestamp::now().to_iso();
    profiles[user_index].insert("balance".to_string(), Value::from(balance + amount));

    let order = &mut orders[order_index];
    order.insert(
        "status".to_string(),
        Value::String(OrderStatus::Cancelled.as_str().to_string()),
    );
    order.insert("updated_at".to_string(), Value::String(now.clone()));
    let cancelled = order.clone();

    let mut ledger = tables.snapshot(ledger_table);
    let mut entry = Row::new();
    entry.insert(
        "id".to_string(),
        Value::from(tables.reserve_id(ledger_table, &ledger)),
    );
    entry.insert("user_id".to_string(), user_id);
    entry.insert("amount".to_string(), Value::from(amount));
    entry.insert(
        "type".to_string(),
        Value::String(TransactionType::Refund.as_str().to_string()),
    );
    entry.insert(
        "description".to_string(),
        Value::String(format!("Refund for order #{}", order_id)),
    );
    entry.insert("order_id".to_string(), order_id.clone());
    entry.insert("created_at".to_string(), Value::String(now));
    ledger.push(entry.clone());

    let owner = profiles[user_index].clone();
    if let Err(e) = tables.replace_all(vec![
        (profiles_table.to_string(), profiles),
        (orders_table.to_string(), orders),
        (ledger_table.to_string(), ledger),
    ]) {
        error!(procedure = REFUND_ORDER, error = %e, "failed to persist refund");
        return Response::failure(e.into());
    }
    drop(lock);

    info!(order = %order_id, amount, "order refunded and cancelled");

    match decode_row::<Profile>(owner) {
        Ok(profile) => match db.sessions().refresh_subject(&profile) {
            Ok(Some(session)) => {
                db.sessions().notify(AuthEvent::UserUpdated, Some(&session));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to refresh session after refund"),
        },
        Err(e) => warn!(error = %e, "refunded profile does not decode, session not refreshed"),
    }

    let events = db.events();
    events.publish(ChangeEvent::update(orders_table, Some(previous), cancelled));
    events.publish(ChangeEvent::insert(ledger_table, entry));

    Response::ok(Some(Value::Bool(true)), 200)
}

/// Current balance of an account. Params: `{ "_user_id": <id> }`.
pub fn get_user_balance(db: &Database, params: &Value) -> Response<Value> {
    let user_id = match param(params, "_user_id") {
        Ok(id) => id,
        Err(e) => return Response::failure(e),
    };
    let profiles = db.tables().snapshot(KnownTable::Profiles.name());
    match find_by_id(&profiles, user_id) {
        Some(index) => {
            let balance = profiles[index]
                .get("balance")
                .and_then(as_number)
                .unwrap_or(0.0);
            Response::ok(Some(Value::from(balance)), 200)
        }
        None => Response::failure(ApiError::not_found("User not found")),
    }
}

/// Whether an account holds a role. Params: `{ "_user_id": <id>, "_role": <role> }`.
pub fn has_role(db: &Database, params: &Value) -> Response<Value> {
    let (user_id, role) = match (param(params, "_user_id"), param(params, "_role")) {
        (Ok(user_id), Ok(role)) => (user_id, role),
        (Err(e), _) | (_, Err(e)) => return Response::failure(e),
    };
    let granted = db
        .tables()
        .snapshot(KnownTable::UserRoles.name())
        .iter()
        .any(|r| {
            r.get("user_id").is_some_and(|v| strict_eq(v, user_id))
                && r.get("role").is_some_and(|v| strict_eq(v, role))
        });
    Response::ok(Some(Value::Bool(granted)), 200)
}
