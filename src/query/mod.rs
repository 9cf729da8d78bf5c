//! PostgREST-style query builder over in-memory tables.
//!
//! A builder is created with [`Database::from`](crate::Database::from),
//! collects filters, a sort key, a limit, a select list and at most one
//! mutation, and runs a single operation on `execute()`:
//!
//! 1. insert: assign `id`/`created_at` when falsy, append, persist, one INSERT event per row
//! 2. update: merge into matching rows, stamp `updated_at`, persist, one UPDATE event per row
//! 3. delete: drop matching rows, persist, one table-level DELETE event
//! 4. select: filter, sort, limit, resolve embeds, then return a list or a single row
//!
//! Filters are always conjoined; there is no OR or grouping.

mod builder;
mod filter;
mod projection;

pub use builder::{Cardinality, OrderBy, QueryBuilder};
pub use filter::{as_number, compare_values, is_truthy, loose_eq, strict_eq, Filter, FilterOp};
pub use projection::{Columns, Embed, Projection, DEFAULT_PROJECTION};
