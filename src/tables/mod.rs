//! Table store: named, ordered row sequences persisted one entry per table.

mod store;

pub use store::TableStore;
