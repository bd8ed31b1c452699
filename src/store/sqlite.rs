//! Durable SQLite storage tier shared by the named stores and the
//! response cache.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::entry::CacheEntry;
use crate::error::{Error, Result};
use crate::request::RequestIdentity;

/// SQLite-backed store holding the entries of every named store plus the
/// response cache's durable tier, keyed by (store name, request identity).
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("failed to create cache directory: {e}")))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| Error::Storage(format!("failed to open cache database at {}: {e}", path.display())))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory store; used by tests and memory-only setups.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(Error::storage)?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Storage("could not determine data directory".into()))?;

    Ok(data_dir.join("offstage").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn.execute_batch(SCHEMA).map_err(Error::storage)?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Storage(format!("lock poisoned: {e}")))
  }

  /// Record a store name with its generation tag.
  pub fn register_store(&self, name: &str, generation: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO stores (name, generation) VALUES (?, ?)",
        params![name, generation],
      )
      .map_err(Error::storage)?;
    Ok(())
  }

  /// Names of every registered store.
  pub fn store_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY name")
      .map_err(Error::storage)?;
    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(Error::storage)?
      .filter_map(|r| r.ok())
      .collect();
    Ok(names)
  }

  /// Insert or replace an entry; last write wins.
  pub fn put(&self, store: &str, entry: &CacheEntry) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO entries (store, key, payload, stored_at, ttl_ms, size)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          store,
          entry.key.as_str(),
          entry.payload,
          entry.stored_at.to_rfc3339(),
          entry.ttl.num_milliseconds(),
          entry.size as i64,
        ],
      )
      .map_err(Error::storage)?;
    Ok(())
  }

  pub fn get(&self, store: &str, key: &RequestIdentity) -> Result<Option<CacheEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT payload, stored_at, ttl_ms, size FROM entries WHERE store = ? AND key = ?")
      .map_err(Error::storage)?;

    // A missing row is a miss; anything else the database reports is a
    // storage failure, never a silent None.
    let row: Option<(Vec<u8>, String, i64, i64)> = stmt
      .query_row(params![store, key.as_str()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()
      .map_err(Error::storage)?;

    match row {
      Some((payload, stored_at, ttl_ms, size)) => Ok(Some(CacheEntry {
        key: key.clone(),
        payload,
        // Unparseable timestamps sort as infinitely old, so the entry is
        // both invalid and first in line for eviction.
        stored_at: parse_timestamp(&stored_at).unwrap_or(DateTime::<Utc>::MIN_UTC),
        ttl: chrono::Duration::milliseconds(ttl_ms),
        size: size as u64,
      })),
      None => Ok(None),
    }
  }

  pub fn delete(&self, store: &str, key: &RequestIdentity) -> Result<bool> {
    let conn = self.lock()?;
    let affected = conn
      .execute(
        "DELETE FROM entries WHERE store = ? AND key = ?",
        params![store, key.as_str()],
      )
      .map_err(Error::storage)?;
    Ok(affected > 0)
  }

  pub fn clear(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM entries WHERE store = ?", params![store])
      .map_err(Error::storage)?;
    Ok(())
  }

  pub fn count(&self, store: &str) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE store = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(Error::storage)?;
    Ok(count as usize)
  }

  /// Evict oldest-first until at most `cap` entries remain in `store`.
  ///
  /// Ages are computed from the stored timestamp; an entry whose timestamp
  /// is missing or unparseable is treated as infinitely old and evicted
  /// first. Returns the number of entries removed.
  pub fn trim_to_cap(&self, store: &str, cap: usize) -> Result<usize> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT key, stored_at FROM entries WHERE store = ?")
      .map_err(Error::storage)?;
    let mut rows: Vec<(String, Option<DateTime<Utc>>)> = stmt
      .query_map(params![store], |row| {
        let key: String = row.get(0)?;
        let stored_at: Option<String> = row.get(1)?;
        Ok((key, stored_at))
      })
      .map_err(Error::storage)?
      .filter_map(|r| r.ok())
      .map(|(key, stored_at)| (key, stored_at.as_deref().and_then(parse_timestamp)))
      .collect();
    drop(stmt);

    if rows.len() <= cap {
      return Ok(0);
    }

    // None (unparseable) sorts before every real timestamp.
    rows.sort_by_key(|(_, stored_at)| *stored_at);

    let excess = rows.len() - cap;
    let mut removed = 0;
    for (key, _) in rows.into_iter().take(excess) {
      removed += conn
        .execute(
          "DELETE FROM entries WHERE store = ? AND key = ?",
          params![store, key],
        )
        .map_err(Error::storage)?;
    }

    debug!(store, removed, "capacity eviction");
    Ok(removed)
  }

  /// Remove every entry in `store` that fails the validity predicate.
  ///
  /// Idempotent: a second consecutive sweep removes nothing.
  pub fn sweep_expired(&self, store: &str, now: DateTime<Utc>) -> Result<usize> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT key, stored_at, ttl_ms FROM entries WHERE store = ?")
      .map_err(Error::storage)?;
    let expired: Vec<String> = stmt
      .query_map(params![store], |row| {
        let key: String = row.get(0)?;
        let stored_at: Option<String> = row.get(1)?;
        let ttl_ms: i64 = row.get(2)?;
        Ok((key, stored_at, ttl_ms))
      })
      .map_err(Error::storage)?
      .filter_map(|r| r.ok())
      .filter(|(_, stored_at, ttl_ms)| {
        match stored_at.as_deref().and_then(parse_timestamp) {
          Some(ts) => now - ts >= chrono::Duration::milliseconds(*ttl_ms),
          // Unparseable timestamp: treat as expired.
          None => true,
        }
      })
      .map(|(key, _, _)| key)
      .collect();
    drop(stmt);

    let mut removed = 0;
    for key in expired {
      removed += conn
        .execute(
          "DELETE FROM entries WHERE store = ? AND key = ?",
          params![store, key],
        )
        .map_err(Error::storage)?;
    }

    Ok(removed)
  }

  /// Delete in full every store whose name is not in `whitelist`.
  ///
  /// This is the generation-rollover mechanism: on activation of a new
  /// cache definition, stores tagged with a previous version disappear
  /// wholesale. Returns the names of the purged stores.
  pub fn purge_except(&self, whitelist: &[String]) -> Result<Vec<String>> {
    let stale: Vec<String> = self
      .store_names()?
      .into_iter()
      .filter(|name| !whitelist.contains(name))
      .collect();

    let conn = self.lock()?;
    for name in &stale {
      conn
        .execute("DELETE FROM entries WHERE store = ?", params![name])
        .map_err(Error::storage)?;
      conn
        .execute("DELETE FROM stores WHERE name = ?", params![name])
        .map_err(Error::storage)?;
    }

    Ok(stale)
  }
}

/// Schema for cache tables.
const SCHEMA: &str = r#"
-- Registry of named stores with their generation tags
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    generation TEXT NOT NULL
);

-- Cache entries keyed by (store, request identity)
CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    key TEXT NOT NULL,
    payload BLOB NOT NULL,
    stored_at TEXT,
    ttl_ms INTEGER NOT NULL,
    size INTEGER NOT NULL,
    PRIMARY KEY (store, key)
);

CREATE INDEX IF NOT EXISTS idx_entries_stored_at ON entries(store, stored_at);
"#;

/// Parse an RFC 3339 timestamp as stored in the database.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::request::Method;
  use chrono::Duration;

  fn entry(url: &str, age_secs: i64, ttl_secs: i64) -> CacheEntry {
    let mut e = CacheEntry::new(
      RequestIdentity::derive(Method::Get, url, None),
      url.as_bytes().to_vec(),
      Duration::seconds(ttl_secs),
    );
    e.stored_at = Utc::now() - Duration::seconds(age_secs);
    e
  }

  #[test]
  fn test_put_get_roundtrip() {
    let store = SqliteStore::open_in_memory().unwrap();
    let e = entry("/a", 0, 60);
    store.put("static", &e).unwrap();

    let loaded = store.get("static", &e.key).unwrap().unwrap();
    assert_eq!(loaded.payload, e.payload);
    assert_eq!(loaded.ttl, e.ttl);
    assert_eq!(loaded.size, e.size);
    // RFC 3339 keeps sub-second precision, so the timestamp survives.
    assert_eq!(loaded.stored_at, e.stored_at);
  }

  #[test]
  fn test_get_missing_is_none() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = RequestIdentity::derive(Method::Get, "/nope", None);
    assert!(store.get("static", &key).unwrap().is_none());
  }

  #[test]
  fn test_stores_are_isolated() {
    let store = SqliteStore::open_in_memory().unwrap();
    let e = entry("/a", 0, 60);
    store.put("static", &e).unwrap();
    assert!(store.get("images", &e.key).unwrap().is_none());
  }

  #[test]
  fn test_delete_and_clear() {
    let store = SqliteStore::open_in_memory().unwrap();
    let e = entry("/a", 0, 60);
    store.put("static", &e).unwrap();

    assert!(store.delete("static", &e.key).unwrap());
    assert!(!store.delete("static", &e.key).unwrap());

    store.put("static", &e).unwrap();
    store.clear("static").unwrap();
    assert_eq!(store.count("static").unwrap(), 0);
  }

  #[test]
  fn test_trim_to_cap_removes_oldest() {
    let store = SqliteStore::open_in_memory().unwrap();

    // 105 entries, oldest have the largest ages.
    for i in 0..105 {
      store.put("static", &entry(&format!("/{i}"), 1000 - i, 10_000)).unwrap();
    }

    let removed = store.trim_to_cap("static", 100).unwrap();
    assert_eq!(removed, 5);
    assert_eq!(store.count("static").unwrap(), 100);

    // The five oldest (/0 .. /4) are exactly the ones gone.
    for i in 0..5 {
      let key = RequestIdentity::derive(Method::Get, &format!("/{i}"), None);
      assert!(store.get("static", &key).unwrap().is_none());
    }
    for i in 5..105 {
      let key = RequestIdentity::derive(Method::Get, &format!("/{i}"), None);
      assert!(store.get("static", &key).unwrap().is_some());
    }
  }

  #[test]
  fn test_trim_evicts_unparseable_timestamps_first() {
    let store = SqliteStore::open_in_memory().unwrap();
    for i in 0..3 {
      store.put("static", &entry(&format!("/{i}"), i, 10_000)).unwrap();
    }

    // Corrupt one timestamp directly; it must be first in line.
    let corrupt = RequestIdentity::derive(Method::Get, "/corrupt", None);
    {
      let conn = store.conn.lock().unwrap();
      conn
        .execute(
          "INSERT INTO entries (store, key, payload, stored_at, ttl_ms, size)
           VALUES ('static', ?, x'00', 'not-a-timestamp', 10000, 1)",
          params![corrupt.as_str()],
        )
        .unwrap();
    }

    let removed = store.trim_to_cap("static", 3).unwrap();
    assert_eq!(removed, 1);
    assert!(store.get("static", &corrupt).unwrap().is_none());
  }

  #[test]
  fn test_get_surfaces_database_errors() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = RequestIdentity::derive(Method::Get, "/bad", None);

    // A row whose ttl_ms is not an integer makes the read fail; that must
    // surface as a storage error, not read as a miss.
    {
      let conn = store.conn.lock().unwrap();
      conn
        .execute(
          "INSERT INTO entries (store, key, payload, stored_at, ttl_ms, size)
           VALUES ('static', ?, x'00', '2024-01-01T00:00:00Z', 'not-a-number', 1)",
          params![key.as_str()],
        )
        .unwrap();
    }

    assert!(matches!(store.get("static", &key), Err(Error::Storage(_))));
  }

  #[test]
  fn test_trim_noop_under_cap() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("static", &entry("/a", 0, 60)).unwrap();
    assert_eq!(store.trim_to_cap("static", 100).unwrap(), 0);
  }

  #[test]
  fn test_sweep_expired_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("api", &entry("/live", 10, 600)).unwrap();
    store.put("api", &entry("/dead", 700, 600)).unwrap();

    let now = Utc::now();
    assert_eq!(store.sweep_expired("api", now).unwrap(), 1);
    assert_eq!(store.count("api").unwrap(), 1);

    // Second consecutive sweep is a no-op.
    assert_eq!(store.sweep_expired("api", now).unwrap(), 0);
    assert_eq!(store.count("api").unwrap(), 1);
  }

  #[test]
  fn test_purge_except_whitelist() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.register_store("static-v1", "v1").unwrap();
    store.register_store("static-v2", "v2").unwrap();
    store.put("static-v1", &entry("/old", 0, 60)).unwrap();
    store.put("static-v2", &entry("/new", 0, 60)).unwrap();

    let purged = store.purge_except(&["static-v2".to_string()]).unwrap();
    assert_eq!(purged, vec!["static-v1".to_string()]);
    assert_eq!(store.count("static-v1").unwrap(), 0);
    assert_eq!(store.count("static-v2").unwrap(), 1);
    assert_eq!(store.store_names().unwrap(), vec!["static-v2".to_string()]);
  }
}
