//! Generation-tagged named store handles.

use std::sync::Arc;

use chrono::Utc;

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::request::RequestIdentity;
use crate::store::SqliteStore;

/// A handle to one named collection of entries inside the durable store.
///
/// The name carries the generation tag (e.g. "static-v3"), so rolling the
/// cache definition forward retires the whole collection at once. The
/// capacity bound is soft: it is restored by housekeeping, not enforced on
/// every write.
#[derive(Clone)]
pub struct NamedStore {
  name: String,
  cap: usize,
  db: Arc<SqliteStore>,
}

impl NamedStore {
  pub fn new(name: impl Into<String>, cap: usize, db: Arc<SqliteStore>) -> Self {
    Self {
      name: name.into(),
      cap,
      db,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn cap(&self) -> usize {
    self.cap
  }

  pub fn get(&self, key: &RequestIdentity) -> Result<Option<CacheEntry>> {
    self.db.get(&self.name, key)
  }

  pub fn put(&self, entry: &CacheEntry) -> Result<()> {
    self.db.put(&self.name, entry)
  }

  pub fn delete(&self, key: &RequestIdentity) -> Result<bool> {
    self.db.delete(&self.name, key)
  }

  pub fn count(&self) -> Result<usize> {
    self.db.count(&self.name)
  }

  /// One housekeeping pass: TTL sweep then capacity trim.
  ///
  /// After this returns, `count() <= cap()` holds.
  pub fn housekeep(&self) -> Result<usize> {
    let swept = self.db.sweep_expired(&self.name, Utc::now())?;
    let trimmed = self.db.trim_to_cap(&self.name, self.cap)?;
    Ok(swept + trimmed)
  }
}
