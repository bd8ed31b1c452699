//! Hit/miss/eviction counters for the diagnostic surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Shared counters; cloning hands out another handle to the same numbers.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
  inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
  hits: AtomicU64,
  misses: AtomicU64,
  evictions: AtomicU64,
  revalidations: AtomicU64,
}

impl CacheStats {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record_hit(&self) {
    self.inner.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_miss(&self) {
    self.inner.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_evictions(&self, count: u64) {
    self.inner.evictions.fetch_add(count, Ordering::Relaxed);
  }

  pub fn record_revalidation(&self) {
    self.inner.revalidations.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      hits: self.inner.hits.load(Ordering::Relaxed),
      misses: self.inner.misses.load(Ordering::Relaxed),
      evictions: self.inner.evictions.load(Ordering::Relaxed),
      revalidations: self.inner.revalidations.load(Ordering::Relaxed),
    }
  }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
  pub revalidations: u64,
}
