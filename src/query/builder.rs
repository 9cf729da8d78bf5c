//! Chainable query builder bound to one table.

use super::filter::{compare_values, is_truthy, Filter, FilterOp};
use super::projection::{Projection, DEFAULT_PROJECTION};
use crate::database::Database;
use crate::error::ApiError;
use crate::types::{ChangeEvent, Response, Row, Timestamp};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::{debug, error, warn};

/// How many rows the caller expects back from a select.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    Many,
    /// `single()`: first row or `null`. Zero rows is not an error.
    Single,
    /// `maybeSingle()`: same behaviour as `Single`.
    MaybeSingle,
}

/// Sort key of a select.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Mutation installed on a builder. Setting one replaces any other.
#[derive(Clone, Debug, PartialEq)]
enum Mutation {
    Insert(Value),
    Update(Value),
    Delete,
}

/// Accumulates constraints against one table and runs exactly one
/// operation when [`execute`](QueryBuilder::execute) is called.
///
/// ```ignore
/// let resp = db
///     .from("orders")
///     .select("*, service:services(id, name)")
///     .eq("user_id", "user-123")
///     .order("created_at", false)
///     .limit(10)
///     .execute();
/// ```
#[must_use = "a query does nothing until `execute` is called"]
pub struct QueryBuilder<'a> {
    db: &'a Database,
    table: String,
    projection: String,
    filters: Vec<Filter>,
    order: Option<OrderBy>,
    limit: Option<usize>,
    cardinality: Cardinality,
    mutation: Option<Mutation>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(db: &'a Database, table: &str) -> Self {
        Self {
            db,
            table: table.to_string(),
            projection: DEFAULT_PROJECTION.to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
            cardinality: Cardinality::Many,
            mutation: None,
        }
    }

    /// Table this builder targets.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Set the select list (columns and embedded tables).
    pub fn select(mut self, projection: &str) -> Self {
        self.projection = projection.to_string();
        self
    }

    fn filter(mut self, column: &str, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter::new(column, op, value));
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Eq, value.into())
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Neq, value.into())
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gt, value.into())
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gte, value.into())
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lt, value.into())
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lte, value.into())
    }

    /// Set membership (`in`).
    pub fn in_<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(column, FilterOp::In, Value::Array(values))
    }

    /// Sort by one column. Ties keep their table order.
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Keep at most `count` rows.
    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn single(mut self) -> Self {
        self.cardinality = Cardinality::Single;
        self
    }

    pub fn maybe_single(mut self) -> Self {
        self.cardinality = Cardinality::MaybeSingle;
        self
    }

    /// Insert one row (object) or several (array of objects). Filters are ignored.
    pub fn insert(mut self, rows: impl Into<Value>) -> Self {
        self.mutation = Some(Mutation::Insert(rows.into()));
        self
    }

    /// Shallow-merge `patch` into every row matching the filters.
    pub fn update(mut self, patch: impl Into<Value>) -> Self {
        self.mutation = Some(Mutation::Update(patch.into()));
        self
    }

    /// Remove every row matching the filters.
    pub fn delete(mut self) -> Self {
        self.mutation = Some(Mutation::Delete);
        self
    }

    /// Run the pending mutation, or select when none is set.
    pub fn execute(mut self) -> Response<Value> {
        if self.table.is_empty() {
            return Response::failure(ApiError::invalid_input("Table name must not be empty"));
        }
        let projection = match Projection::parse(&self.projection) {
            Ok(p) => p,
            Err(e) => return Response::failure(e),
        };

        match self.mutation.take() {
            Some(Mutation::Insert(payload)) => self.run_insert(payload),
            Some(Mutation::Update(patch)) => self.run_update(patch, &projection),
            Some(Mutation::Delete) => self.run_delete(),
            None => self.run_select(&projection),
        }
    }

    fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    fn run_insert(self, payload: Value) -> Response<Value> {
        let (incoming, bulk) = match payload {
            Value::Object(row) => (vec![row], false),
            Value::Array(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(row) => rows.push(row),
                        _ => {
                            return Response::failure(ApiError::invalid_input(
                                "Insert payload must contain only objects",
                            ))
                        }
                    }
                }
                (rows, true)
            }
            _ => {
                return Response::failure(ApiError::invalid_input(
                    "Insert payload must be an object or an array of objects",
                ))
            }
        };
        if incoming.is_empty() {
            return Response::ok(Some(Value::Array(Vec::new())), 201);
        }

        let tables = self.db.tables();
        let lock = self.db.write_lock();

        let mut rows = tables.snapshot(&self.table);
        let now = Timestamp::now().to_iso();
        let mut inserted = Vec::with_capacity(incoming.len());

        for mut row in incoming {
            if !is_truthy(row.get("id")) {
                let id = tables.reserve_id(&self.table, &rows);
                row.insert("id".to_string(), Value::from(id));
            }
            if !is_truthy(row.get("created_at")) {
                row.insert("created_at".to_string(), Value::String(now.clone()));
            }
            rows.push(row.clone());
            inserted.push(row);
        }

        if let Err(e) = tables.replace(&self.table, rows) {
            error!(table = %self.table, error = %e, "failed to persist insert");
            return Response::failure(e.into());
        }
        drop(lock);

        debug!(table = %self.table, rows = inserted.len(), "inserted rows");
        for row in &inserted {
            self.db.events().publish(ChangeEvent::insert(&self.table, row.clone()));
        }

        let data = if bulk && self.cardinality == Cardinality::Many {
            Value::Array(inserted.into_iter().map(Value::Object).collect())
        } else {
            inserted.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
        };
        Response::ok(Some(data), 201)
    }

    fn run_update(self, patch: Value, projection: &Projection) -> Response<Value> {
        let Value::Object(patch) = patch else {
            return Response::failure(ApiError::invalid_input("Update payload must be an object"));
        };

        let tables = self.db.tables();
        let lock = self.db.write_lock();

        let now = Timestamp::now().to_iso();
        let mut updated = Vec::new();
        let rows: Vec<Row> = tables
            .snapshot(&self.table)
            .into_iter()
            .map(|row| {
                if !self.matches(&row) {
                    return row;
                }
                let mut merged = row;
                for (column, value) in &patch {
                    merged.insert(column.clone(), value.clone());
                }
                merged.insert("updated_at".to_string(), Value::String(now.clone()));
                updated.push(merged.clone());
                merged
            })
            .collect();

        let count = updated.len();
        if count == 0 {
            drop(lock);
            warn!(table = %self.table, "update matched no rows");
        } else {
            if let Err(e) = tables.replace(&self.table, rows) {
                error!(table = %self.table, error = %e, "failed to persist update");
                return Response::failure(e.into());
            }
            drop(lock);

            debug!(table = %self.table, rows = count, "updated rows");
            // The previous row is not carried on update events.
            for row in &updated {
                self.db
                    .events()
                    .publish(ChangeEvent::update(&self.table, None, row.clone()));
            }
        }

        let data = if projection.is_default() {
            None
        } else {
            let shaped = projection.apply(updated, tables);
            Some(self.shape(shaped))
        };
        Response::ok(data, 200).with_count(count)
    }

    fn run_delete(self) -> Response<Value> {
        let tables = self.db.tables();
        let lock = self.db.write_lock();

        let before = tables.snapshot(&self.table);
        let total = before.len();
        let kept: Vec<Row> = before.into_iter().filter(|row| !self.matches(row)).collect();
        let deleted = total - kept.len();

        if deleted > 0 {
            if let Err(e) = tables.replace(&self.table, kept) {
                error!(table = %self.table, error = %e, "failed to persist delete");
                return Response::failure(e.into());
            }
            drop(lock);

            debug!(table = %self.table, rows = deleted, "deleted rows");
            self.db.events().publish(ChangeEvent::delete(&self.table));
        }

        Response::ok(None, 204).with_count(deleted)
    }

    fn run_select(self, projection: &Projection) -> Response<Value> {
        let tables = self.db.tables();
        let mut rows: Vec<Row> = tables
            .snapshot(&self.table)
            .into_iter()
            .filter(|row| self.matches(row))
            .collect();

        if let Some(order) = &self.order {
            rows.sort_by(|a, b| {
                let ordering = match (a.get(&order.column), b.get(&order.column)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        let rows = projection.apply(rows, tables);
        let count = rows.len();
        match self.cardinality {
            Cardinality::Many => Response::ok(Some(self.shape(rows)), 200).with_count(count),
            Cardinality::Single | Cardinality::MaybeSingle => {
                Response::ok(rows.into_iter().next().map(Value::Object), 200)
            }
        }
    }

    /// Collapse rows to the requested cardinality.
    fn shape(&self, rows: Vec<Row>) -> Value {
        match self.cardinality {
            Cardinality::Many => Value::Array(rows.into_iter().map(Value::Object).collect()),
            Cardinality::Single | Cardinality::MaybeSingle => {
                rows.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
            }
        }
    }
}
