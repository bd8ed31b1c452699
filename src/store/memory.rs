//! Ephemeral in-process storage tier.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::entry::CacheEntry;
use crate::request::RequestIdentity;

/// In-memory entry map, used as the fast tier of the response cache.
///
/// Concurrent writers to the same key resolve last-write-wins; there is no
/// merge or conflict detection.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: RwLock<HashMap<RequestIdentity, CacheEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn get(&self, key: &RequestIdentity) -> Option<CacheEntry> {
    self.entries.read().await.get(key).cloned()
  }

  pub async fn put(&self, entry: CacheEntry) {
    self.entries.write().await.insert(entry.key.clone(), entry);
  }

  pub async fn remove(&self, key: &RequestIdentity) -> bool {
    self.entries.write().await.remove(key).is_some()
  }

  pub async fn clear(&self) {
    self.entries.write().await.clear();
  }

  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.entries.read().await.is_empty()
  }

  /// Evict oldest-first until at most `cap` entries remain.
  ///
  /// Returns the number of entries removed.
  pub async fn evict_oldest_to(&self, cap: usize) -> usize {
    let mut entries = self.entries.write().await;
    if entries.len() <= cap {
      return 0;
    }

    let mut by_age: Vec<(RequestIdentity, DateTime<Utc>)> = entries
      .iter()
      .map(|(key, entry)| (key.clone(), entry.stored_at))
      .collect();
    by_age.sort_by_key(|(_, stored_at)| *stored_at);

    let excess = entries.len() - cap;
    let mut removed = 0;
    for (key, _) in by_age.into_iter().take(excess) {
      entries.remove(&key);
      removed += 1;
    }
    removed
  }

  /// Remove every entry that fails the validity predicate at `now`.
  pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
    let mut entries = self.entries.write().await;
    let before = entries.len();
    entries.retain(|_, entry| entry.is_valid_at(now));
    before - entries.len()
  }
}
