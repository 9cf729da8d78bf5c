//! Durable key-value storage backing the table engine.
//!
//! The engine keeps one entry per table (a JSON array of rows) and one
//! entry for the current session. Backends only need string keys and
//! string values:
//! - [`MemoryStorage`]: process-local map, used by tests and ephemeral engines
//! - [`FileStorage`]: one JSON file per key inside a locked directory

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// Host key-value storage.
///
/// Writes are synchronous: once `set` returns, a following `get` observes
/// the new value.
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>>;
}
