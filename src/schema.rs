//! Typed views of the storefront tables.
//!
//! The engine stores rows as JSON maps; these types give the known tables a
//! compile-time shape. Every record keeps columns it does not model in
//! `extra`, so converting a row to a record and back loses nothing.

use crate::error::{Result, StoreError};
use crate::types::Row;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Tables the storefront knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KnownTable {
    Categories,
    Services,
    Profiles,
    Orders,
    UserRoles,
    Transactions,
}

impl KnownTable {
    pub const ALL: [KnownTable; 6] = [
        KnownTable::Categories,
        KnownTable::Services,
        KnownTable::Profiles,
        KnownTable::Orders,
        KnownTable::UserRoles,
        KnownTable::Transactions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KnownTable::Categories => "categories",
            KnownTable::Services => "services",
            KnownTable::Profiles => "profiles",
            KnownTable::Orders => "orders",
            KnownTable::UserRoles => "user_roles",
            KnownTable::Transactions => "transactions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for KnownTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppRole {
    #[default]
    User,
    Admin,
}

impl AppRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AppRole::User => "user",
            AppRole::Admin => "admin",
        }
    }
}

/// Order lifecycle. Both spellings of "cancelled" occur in stored data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Canceled,
    Refunded,
}

impl OrderStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "canceled" => Some(OrderStatus::Canceled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Terminal states from which no refund may be issued.
    pub fn is_cancelled(self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Canceled | OrderStatus::Refunded
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Smm,
    DigitalProduct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Refund,
    OrderSpend,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Refund => "refund",
            TransactionType::OrderSpend => "order_spend",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Read `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_true<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// Numbers, numeric strings and `null` (as zero).
fn lenient_amount<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

/// Unknown or missing roles read as the default role.
fn lenient_role<'de, D>(deserializer: D) -> std::result::Result<AppRole, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Row,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub price_per_1000: Option<f64>,
    #[serde(default)]
    pub fixed_price: Option<f64>,
    #[serde(default)]
    pub min_quantity: Option<i64>,
    #[serde(default)]
    pub max_quantity: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Row,
}

/// An account. Also the user snapshot embedded in a session.
///
/// Profile rows can be written through the query builder, so decoding is
/// forgiving: the id keeps whatever JSON type the row holds and `null`
/// columns read as their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: AppRole,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub balance: f64,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Row>,
    #[serde(flatten)]
    pub extra: Row,
}

impl Profile {
    /// A fresh account with the default role, zero balance, active.
    pub fn new(id: impl Into<Value>, email: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role: AppRole::User,
            balance: 0.0,
            is_active: true,
            created_at: created_at.into(),
            updated_at: None,
            metadata: None,
            extra: Row::new(),
        }
    }

    /// The id as text: strings verbatim, other values in JSON form.
    pub fn subject(&self) -> String {
        match &self.id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: String,
    #[serde(default)]
    pub service_id: Option<i64>,
    pub status: OrderStatus,
    #[serde(default, alias = "total_cost")]
    pub amount: f64,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub fulfillment_data: Option<Value>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Row,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRole {
    /// Seeded roles use string ids, builder inserts get numeric ones.
    pub id: Value,
    pub user_id: String,
    #[serde(default)]
    pub role: AppRole,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Row,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Row,
}

/// A row tagged with the table it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum TableRecord {
    Category(Category),
    Service(Service),
    Profile(Profile),
    Order(Order),
    UserRole(UserRole),
    Transaction(Transaction),
    /// A table without a modeled schema.
    Other { table: String, row: Row },
}

impl TableRecord {
    /// Decode `row` according to the schema of `table`.
    pub fn from_row(table: &str, row: Row) -> Result<Self> {
        let Some(known) = KnownTable::from_name(table) else {
            return Ok(TableRecord::Other {
                table: table.to_string(),
                row,
            });
        };
        Ok(match known {
            KnownTable::Categories => TableRecord::Category(decode_row(row)?),
            KnownTable::Services => TableRecord::Service(decode_row(row)?),
            KnownTable::Profiles => TableRecord::Profile(decode_row(row)?),
            KnownTable::Orders => TableRecord::Order(decode_row(row)?),
            KnownTable::UserRoles => TableRecord::UserRole(decode_row(row)?),
            KnownTable::Transactions => TableRecord::Transaction(decode_row(row)?),
        })
    }

    /// Name of the table this record belongs to.
    pub fn table(&self) -> &str {
        match self {
            TableRecord::Category(_) => KnownTable::Categories.name(),
            TableRecord::Service(_) => KnownTable::Services.name(),
            TableRecord::Profile(_) => KnownTable::Profiles.name(),
            TableRecord::Order(_) => KnownTable::Orders.name(),
            TableRecord::UserRole(_) => KnownTable::UserRoles.name(),
            TableRecord::Transaction(_) => KnownTable::Transactions.name(),
            TableRecord::Other { table, .. } => table,
        }
    }

    pub fn into_row(self) -> Result<Row> {
        match self {
            TableRecord::Category(r) => encode_row(&r),
            TableRecord::Service(r) => encode_row(&r),
            TableRecord::Profile(r) => encode_row(&r),
            TableRecord::Order(r) => encode_row(&r),
            TableRecord::UserRole(r) => encode_row(&r),
            TableRecord::Transaction(r) => encode_row(&r),
            TableRecord::Other { row, .. } => Ok(row),
        }
    }
}

/// Decode a row into a typed record.
pub fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| StoreError::Deserialization(e.to_string()))
}

/// Encode a typed record as a row.
pub fn encode_row<T: Serialize>(record: &T) -> Result<Row> {
    match serde_json::to_value(record)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::Serialization(format!(
            "record encoded to a non-object value: {}",
            other
        ))),
    }
}
