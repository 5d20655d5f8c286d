//! Durable key/value storage shared by the session and the dashboard cache.
//!
//! Values are opaque strings. Every backend must:
//! - remove a set of keys atomically (no reader observes a partial removal)
//! - report keys changed by *other* writers through [`KeyValueStore::poll_external_changes`]

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;

/// Trait for key/value storage backends.
pub trait KeyValueStore: Send + Sync {
  /// Read a value.
  fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  /// Insert or overwrite a value.
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

  /// Remove every key in `keys` as one atomic operation.
  fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError>;

  /// Keys written or removed by another connection since the last poll.
  ///
  /// Writes made through this handle are never reported.
  fn poll_external_changes(&self) -> Result<Vec<String>, StoreError>;
}
