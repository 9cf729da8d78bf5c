//! Core types for the table engine.

use crate::error::ApiError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One record of a table: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    /// RFC 3339 rendering with millisecond precision and a `Z` suffix,
    /// the format every `created_at`/`updated_at` column carries.
    pub fn to_iso(self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_iso())
    }
}

/// Kind of row mutation carried by a [`ChangeEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification describing one table mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    pub old: Option<Row>,
    pub new: Option<Row>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            event_type: ChangeKind::Insert,
            old: None,
            new: Some(row),
        }
    }

    pub fn update(table: impl Into<String>, old: Option<Row>, new: Row) -> Self {
        Self {
            table: table.into(),
            event_type: ChangeKind::Update,
            old,
            new: Some(new),
        }
    }

    /// Table-level delete notification; carries no row payloads.
    pub fn delete(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            event_type: ChangeKind::Delete,
            old: None,
            new: None,
        }
    }
}

/// Envelope returned by every terminal engine operation.
///
/// Failures are data: `error` is `None` on success, otherwise it describes
/// what went wrong and `data` is usually `None`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Response<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub count: Option<usize>,
    pub status: u16,
}

impl<T> Response<T> {
    pub fn ok(data: Option<T>, status: u16) -> Self {
        Self {
            data,
            error: None,
            count: None,
            status,
        }
    }

    pub fn failure(error: ApiError) -> Self {
        Self {
            data: None,
            status: error.status(),
            error: Some(error),
            count: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn status_text(&self) -> &'static str {
        match self.status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "",
        }
    }

    /// Convert into a `Result` for callers that want `?`.
    pub fn into_result(self) -> std::result::Result<Option<T>, ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            data: self.data.map(f),
            error: self.error,
            count: self.count,
            status: self.status,
        }
    }
}

impl Response<Value> {
    /// Decode `data` into a typed value (a record or a `Vec` of records).
    pub fn decode<U: DeserializeOwned>(&self) -> std::result::Result<Option<U>, ApiError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ApiError::internal("Failed to decode response").with_details(e.to_string())),
        }
    }

    /// Rows carried by `data`: a list, a single row, or nothing.
    pub fn rows(&self) -> Vec<Row> {
        match &self.data {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
            Some(Value::Object(row)) => vec![row.clone()],
            _ => Vec::new(),
        }
    }
}
