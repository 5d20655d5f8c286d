//! SQLite-backed key/value store.

use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use super::KeyValueStore;
use crate::error::StoreError;

/// Schema for the key/value tables.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    revision INTEGER NOT NULL
);

-- Single-row counter; revisions are never reused, even after deletes
CREATE TABLE IF NOT EXISTS kv_revision (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    counter INTEGER NOT NULL
);

INSERT OR IGNORE INTO kv_revision (id, counter) VALUES (0, 0);
"#;

struct Inner {
  conn: Connection,
  /// Revision of every key as last written or observed by this connection
  seen: HashMap<String, i64>,
  /// Last `PRAGMA data_version`; changes only when another connection commits
  data_version: i64,
}

/// SQLite storage. Several processes may open the same file; each one learns
/// about the others' writes through [`KeyValueStore::poll_external_changes`].
pub struct SqliteStore {
  inner: Mutex<Inner>,
}

impl SqliteStore {
  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(STORE_SCHEMA)?;

    let seen = read_revisions(&conn)?;
    let data_version = read_data_version(&conn)?;
    debug!(path = %path.display(), keys = seen.len(), "opened key/value store");

    Ok(Self {
      inner: Mutex::new(Inner {
        conn,
        seen,
        data_version,
      }),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StoreError::NoDataDir)?;

    Ok(data_dir.join("studentlife").join("storage.db"))
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    let mut stmt = inner.conn.prepare_cached("SELECT value FROM kv WHERE key = ?")?;
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
      Some(row) => Ok(Some(row.get(0)?)),
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    let inner = &mut *guard;

    let tx = inner.conn.transaction()?;
    let revision: i64 = tx.query_row(
      "UPDATE kv_revision SET counter = counter + 1 WHERE id = 0 RETURNING counter",
      [],
      |row| row.get(0),
    )?;
    tx.execute(
      "INSERT INTO kv (key, value, revision) VALUES (?1, ?2, ?3)
       ON CONFLICT(key) DO UPDATE SET value = excluded.value, revision = excluded.revision",
      params![key, value, revision],
    )?;
    tx.commit()?;

    inner.seen.insert(key.to_string(), revision);
    Ok(())
  }

  fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
    let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    let inner = &mut *guard;

    let tx = inner.conn.transaction()?;
    for key in keys {
      tx.execute("DELETE FROM kv WHERE key = ?", params![key])?;
    }
    tx.commit()?;

    for key in keys {
      inner.seen.remove(*key);
    }
    Ok(())
  }

  fn poll_external_changes(&self) -> Result<Vec<String>, StoreError> {
    let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    let inner = &mut *guard;

    let data_version = read_data_version(&inner.conn)?;
    if data_version == inner.data_version {
      return Ok(Vec::new());
    }
    inner.data_version = data_version;

    let current = read_revisions(&inner.conn)?;
    let mut changed: Vec<String> = current
      .iter()
      .filter(|(key, revision)| inner.seen.get(*key) != Some(*revision))
      .map(|(key, _)| key.clone())
      .collect();
    changed.extend(
      inner
        .seen
        .keys()
        .filter(|key| !current.contains_key(*key))
        .cloned(),
    );
    changed.sort();

    inner.seen = current;
    Ok(changed)
  }
}

fn read_revisions(conn: &Connection) -> Result<HashMap<String, i64>, StoreError> {
  let mut stmt = conn.prepare_cached("SELECT key, revision FROM kv")?;
  let revisions = stmt
    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect::<Result<HashMap<String, i64>, _>>()?;
  Ok(revisions)
}

fn read_data_version(conn: &Connection) -> Result<i64, StoreError> {
  Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}
