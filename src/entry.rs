//! Cache entry with TTL-based validity.

use chrono::{DateTime, Duration, Utc};

use crate::request::RequestIdentity;

/// A single cached response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  /// Unique key derived from the originating request.
  pub key: RequestIdentity,
  /// Raw response payload (bytes or serialized JSON).
  pub payload: Vec<u8>,
  /// When the entry was written.
  pub stored_at: DateTime<Utc>,
  /// How long the entry stays valid after `stored_at`.
  pub ttl: Duration,
  /// Payload size in bytes, tracked for diagnostics.
  pub size: u64,
}

impl CacheEntry {
  /// Create an entry stamped with the current time.
  pub fn new(key: RequestIdentity, payload: Vec<u8>, ttl: Duration) -> Self {
    let size = payload.len() as u64;
    Self {
      key,
      payload,
      stored_at: Utc::now(),
      ttl,
      size,
    }
  }

  /// Validity predicate: `now - stored_at < ttl`, strictly.
  ///
  /// The boundary matters: an entry aged exactly `ttl` is already invalid.
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    now - self.stored_at < self.ttl
  }

  pub fn is_valid(&self) -> bool {
    self.is_valid_at(Utc::now())
  }

  /// Age of the entry at the given instant.
  pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
    now - self.stored_at
  }
}
