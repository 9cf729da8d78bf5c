//! Select-list parsing and embedded-resource resolution.
//!
//! Grammar (comma separated, whitespace ignored):
//!
//! ```text
//! item     := "*" | column | embed
//! embed    := [alias ":"] table "(" item-list ")"
//! ```
//!
//! An embed is resolved by convention: the foreign key is `<alias>_id` on
//! the parent row and it references `id` on the embedded table.

use super::filter::{is_truthy, strict_eq};
use crate::error::ApiError;
use crate::tables::TableStore;
use crate::types::Row;
use serde_json::Value;

/// Projection used when `select` is never called.
pub const DEFAULT_PROJECTION: &str = "*";

/// Which columns of a row to keep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Columns {
    All,
    Only(Vec<String>),
}

impl Columns {
    fn apply(&self, row: Row, keep: &[String]) -> Row {
        match self {
            Columns::All => row,
            Columns::Only(columns) => row
                .into_iter()
                .filter(|(k, _)| columns.contains(k) || keep.contains(k))
                .collect(),
        }
    }
}

/// One embedded (joined) table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Embed {
    /// Field the joined row is attached under.
    pub alias: String,
    /// Table the joined row comes from.
    pub table: String,
    /// Columns of the joined row to keep.
    pub columns: Columns,
}

impl Embed {
    /// Parent column holding the foreign key.
    pub fn foreign_key(&self) -> String {
        format!("{}_id", self.alias)
    }
}

/// Parsed select list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    raw: String,
    pub columns: Columns,
    pub embeds: Vec<Embed>,
}

impl Projection {
    /// Parse a select list such as `"*, service:services(id, name)"`.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let mut wildcard = false;
        let mut columns = Vec::new();
        let mut embeds = Vec::new();

        for item in split_top_level(raw)? {
            if item == "*" {
                wildcard = true;
            } else if let Some(open) = item.find('(') {
                let Some(inner) = item[open + 1..].strip_suffix(')') else {
                    return Err(invalid(raw, "embedded resource must end with ')'"));
                };
                let head = item[..open].trim();
                let (alias, table) = match head.split_once(':') {
                    Some((alias, table)) => (alias.trim(), table.trim()),
                    None => (head, head),
                };
                if alias.is_empty() || table.is_empty() {
                    return Err(invalid(raw, "embedded resource needs a table name"));
                }
                let nested = Projection::parse(inner)?;
                if !nested.embeds.is_empty() {
                    return Err(invalid(raw, "only one level of embedding is supported"));
                }
                embeds.push(Embed {
                    alias: alias.to_string(),
                    table: table.to_string(),
                    columns: nested.columns,
                });
            } else if item.contains(')') {
                return Err(invalid(raw, "unbalanced ')'"));
            } else {
                columns.push(item.to_string());
            }
        }

        let columns = if wildcard || columns.is_empty() {
            Columns::All
        } else {
            Columns::Only(columns)
        };

        Ok(Self {
            raw: raw.trim().to_string(),
            columns,
            embeds,
        })
    }

    /// Whether this is the default `*` projection, as spelled by the caller.
    pub fn is_default(&self) -> bool {
        self.raw == DEFAULT_PROJECTION
    }

    /// Resolve embeds against their tables' persisted snapshots and trim columns.
    pub fn apply(&self, rows: Vec<Row>, tables: &TableStore) -> Vec<Row> {
        let lookups: Vec<(&Embed, Vec<Row>)> = self
            .embeds
            .iter()
            .map(|embed| (embed, tables.persisted_snapshot(&embed.table)))
            .collect();
        let aliases: Vec<String> = self.embeds.iter().map(|e| e.alias.clone()).collect();

        rows.into_iter()
            .map(|mut row| {
                for (embed, candidates) in &lookups {
                    let fk = row.get(&embed.foreign_key()).cloned();
                    if !is_truthy(fk.as_ref()) {
                        continue;
                    }
                    let joined = fk
                        .and_then(|fk| {
                            candidates
                                .iter()
                                .find(|c| c.get("id").is_some_and(|id| strict_eq(id, &fk)))
                        })
                        .map(|c| Value::Object(embed.columns.apply(c.clone(), &[])))
                        .unwrap_or(Value::Null);
                    row.insert(embed.alias.clone(), joined);
                }
                self.columns.apply(row, &aliases)
            })
            .collect()
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            raw: DEFAULT_PROJECTION.to_string(),
            columns: Columns::All,
            embeds: Vec::new(),
        }
    }
}

fn invalid(raw: &str, reason: &str) -> ApiError {
    ApiError::invalid_input(format!("Invalid select list: {}", reason)).with_details(raw.to_string())
}

/// Split on commas that are not inside parentheses.
fn split_top_level(raw: &str) -> Result<Vec<&str>, ApiError> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(raw, "unbalanced ')'"))?;
            }
            ',' if depth == 0 => {
                items.push(raw[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid(raw, "unbalanced '('"));
    }
    items.push(raw[start..].trim());

    Ok(items.into_iter().filter(|item| !item.is_empty()).collect())
}
