//! Explicitly-invoked tiered response cache.
//!
//! Independent of the interception layer: the host wraps specific outbound
//! calls in this cache where transparent interception is not applicable.
//! Entries live in an ephemeral memory tier and/or the shared durable
//! store, selected per instance.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::error::{Error, Result};
use crate::request::{Method, Request, RequestIdentity};
use crate::stats::{CacheStats, StatsSnapshot};
use crate::store::{MemoryStore, SqliteStore};
use crate::transport::Transport;

/// Name of the durable-tier store backing every response cache. Not
/// generation-tagged: it survives cache-definition rollovers.
pub(crate) const DURABLE_STORE: &str = "response-cache";

/// Which storage tiers a response cache writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSelection {
  pub memory: bool,
  pub durable: bool,
}

impl Default for TierSelection {
  fn default() -> Self {
    Self {
      memory: true,
      durable: true,
    }
  }
}

impl TierSelection {
  pub fn memory_only() -> Self {
    Self {
      memory: true,
      durable: false,
    }
  }
}

/// Explicit configuration surface of the response cache.
#[derive(Debug, Clone)]
pub struct ResponseCacheConfig {
  /// Default entry lifetime.
  pub ttl: Duration,
  /// Memory-tier entry cap; the oldest entries are evicted past it.
  pub max_size: usize,
  pub tiers: TierSelection,
}

impl Default for ResponseCacheConfig {
  fn default() -> Self {
    Self {
      ttl: Duration::minutes(5),
      max_size: 100,
      tiers: TierSelection::default(),
    }
  }
}

/// Tiered (memory + durable) cache for wrapped outbound calls.
pub struct ResponseCache {
  config: ResponseCacheConfig,
  memory: MemoryStore,
  durable: Option<Arc<SqliteStore>>,
  stats: CacheStats,
}

impl ResponseCache {
  /// Create a response cache. A durable store handle is required exactly
  /// when the durable tier is selected.
  pub fn new(config: ResponseCacheConfig, durable: Option<Arc<SqliteStore>>) -> Result<Self> {
    if config.tiers.durable && durable.is_none() {
      return Err(Error::Config("durable tier selected but no durable store supplied".into()));
    }
    if !config.tiers.memory && !config.tiers.durable {
      return Err(Error::Config("at least one storage tier must be selected".into()));
    }

    let durable = if config.tiers.durable { durable } else { None };
    if let Some(db) = &durable {
      db.register_store(DURABLE_STORE, "response-cache")?;
    }

    Ok(Self {
      config,
      memory: MemoryStore::new(),
      durable,
      stats: CacheStats::new(),
    })
  }

  fn key(url: &str, params: Option<&serde_json::Value>) -> RequestIdentity {
    RequestIdentity::derive(Method::Get, url, params)
  }

  /// Look up a cached payload: memory tier first, then durable with
  /// promotion into memory on a hit. Expired entries are treated as
  /// misses and left for `cleanup`.
  pub async fn get(&self, url: &str, params: Option<&serde_json::Value>) -> Result<Option<serde_json::Value>> {
    let key = Self::key(url, params);
    let now = Utc::now();

    if self.config.tiers.memory {
      if let Some(entry) = self.memory.get(&key).await {
        if entry.is_valid_at(now) {
          self.stats.record_hit();
          return Ok(Some(parse_payload(&entry.payload)?));
        }
      }
    }

    if let Some(db) = &self.durable {
      if let Some(entry) = db.get(DURABLE_STORE, &key)? {
        if entry.is_valid_at(now) {
          let value = parse_payload(&entry.payload)?;
          // Promote so the next lookup stays in-process.
          if self.config.tiers.memory {
            self.memory.put(entry).await;
          }
          self.stats.record_hit();
          return Ok(Some(value));
        }
      }
    }

    self.stats.record_miss();
    Ok(None)
  }

  /// Write a payload to every selected tier, then evict the memory tier
  /// down to `max_size`, oldest first.
  pub async fn set(
    &self,
    url: &str,
    data: &serde_json::Value,
    params: Option<&serde_json::Value>,
    ttl: Option<Duration>,
  ) -> Result<()> {
    let key = Self::key(url, params);
    let payload = serde_json::to_vec(data).map_err(|e| Error::InvalidPayload(e.to_string()))?;
    let entry = CacheEntry::new(key, payload, ttl.unwrap_or(self.config.ttl));

    if let Some(db) = &self.durable {
      db.put(DURABLE_STORE, &entry)?;
    }

    if self.config.tiers.memory {
      self.memory.put(entry).await;
      let evicted = self.memory.evict_oldest_to(self.config.max_size).await;
      if evicted > 0 {
        self.stats.record_evictions(evicted as u64);
        debug!(evicted, "memory tier over max_size");
      }
    }

    Ok(())
  }

  /// Remove one entry from every selected tier.
  pub async fn delete(&self, url: &str, params: Option<&serde_json::Value>) -> Result<bool> {
    let key = Self::key(url, params);
    let mut removed = false;

    if self.config.tiers.memory {
      removed |= self.memory.remove(&key).await;
    }
    if let Some(db) = &self.durable {
      removed |= db.delete(DURABLE_STORE, &key)?;
    }

    Ok(removed)
  }

  /// Drop every entry from every selected tier.
  pub async fn clear(&self) -> Result<()> {
    if self.config.tiers.memory {
      self.memory.clear().await;
    }
    if let Some(db) = &self.durable {
      db.clear(DURABLE_STORE)?;
    }
    Ok(())
  }

  /// Sweep expired entries from every selected tier. Idempotent: a second
  /// consecutive call removes nothing.
  pub async fn cleanup(&self) -> Result<usize> {
    let now = Utc::now();
    let mut removed = 0;

    if self.config.tiers.memory {
      removed += self.memory.sweep_expired(now).await;
    }
    if let Some(db) = &self.durable {
      removed += db.sweep_expired(DURABLE_STORE, now)?;
    }

    if removed > 0 {
      self.stats.record_evictions(removed as u64);
    }
    Ok(removed)
  }

  /// Wrapped call: serve from cache or fetch-and-populate.
  ///
  /// Only read-equivalent requests are cached; anything else goes straight
  /// through the transport. On a hit the network client is not invoked at
  /// all. On a miss a successful, JSON-parseable response is written
  /// through before being returned; a write failure only means the result
  /// is not cached this time.
  pub async fn cached_request(&self, transport: &dyn Transport, req: &Request) -> Result<serde_json::Value> {
    if !req.method.is_read() {
      let response = transport.fetch(req).await?;
      return parse_response(req, response);
    }

    if let Some(value) = self.get(&req.url, req.params.as_ref()).await? {
      debug!(url = %req.url, "wrapped call served from cache");
      return Ok(value);
    }

    let response = transport.fetch(req).await?;
    let value = parse_response(req, response)?;

    if let Err(e) = self.set(&req.url, &value, req.params.as_ref(), None).await {
      warn!(url = %req.url, error = %e, "response will not be cached");
    }

    Ok(value)
  }

  /// Entry counts per tier, for observability.
  pub async fn entry_counts(&self) -> Result<(usize, usize)> {
    let memory = if self.config.tiers.memory {
      self.memory.len().await
    } else {
      0
    };
    let durable = match &self.durable {
      Some(db) => db.count(DURABLE_STORE)?,
      None => 0,
    };
    Ok((memory, durable))
  }

  pub fn stats(&self) -> StatsSnapshot {
    self.stats.snapshot()
  }
}

fn parse_payload(payload: &[u8]) -> Result<serde_json::Value> {
  serde_json::from_slice(payload).map_err(|e| Error::InvalidPayload(e.to_string()))
}

fn parse_response(req: &Request, response: crate::transport::HttpResponse) -> Result<serde_json::Value> {
  if !response.is_ok() {
    return Err(Error::Network(format!(
      "{} returned status {}",
      req.url, response.status
    )));
  }
  parse_payload(&response.body)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transport::HttpResponse;
  use async_trait::async_trait;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FakeTransport {
    status: u16,
    body: Vec<u8>,
    calls: AtomicUsize,
  }

  impl FakeTransport {
    fn json(body: serde_json::Value) -> Self {
      Self {
        status: 200,
        body: serde_json::to_vec(&body).unwrap(),
        calls: AtomicUsize::new(0),
      }
    }

    fn status(status: u16, body: &[u8]) -> Self {
      Self {
        status,
        body: body.to_vec(),
        calls: AtomicUsize::new(0),
      }
    }

    fn call_count(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Transport for FakeTransport {
    async fn fetch(&self, _req: &Request) -> Result<HttpResponse> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(HttpResponse::new(self.status, self.body.clone()))
    }
  }

  fn tiered_cache(config: ResponseCacheConfig) -> ResponseCache {
    let db = Arc::new(SqliteStore::open_in_memory().unwrap());
    ResponseCache::new(config, Some(db)).unwrap()
  }

  #[tokio::test]
  async fn test_set_get_roundtrip_deep_equal() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    let data = json!({"items": [1, 2, 3], "nested": {"a": "b"}});

    cache.set("/api/items", &data, None, None).await.unwrap();
    let loaded = cache.get("/api/items", None).await.unwrap();
    assert_eq!(loaded, Some(data));
  }

  #[tokio::test]
  async fn test_params_disambiguate_entries() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    let p1 = json!({"page": 1});
    let p2 = json!({"page": 2});

    cache.set("/api/items", &json!(["a"]), Some(&p1), None).await.unwrap();
    cache.set("/api/items", &json!(["b"]), Some(&p2), None).await.unwrap();

    assert_eq!(cache.get("/api/items", Some(&p1)).await.unwrap(), Some(json!(["a"])));
    assert_eq!(cache.get("/api/items", Some(&p2)).await.unwrap(), Some(json!(["b"])));
  }

  #[tokio::test]
  async fn test_expired_entry_is_a_miss() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    cache
      .set("/api/items", &json!(1), None, Some(Duration::milliseconds(-1)))
      .await
      .unwrap();
    assert_eq!(cache.get("/api/items", None).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_durable_hit_promotes_to_memory() {
    let db = Arc::new(SqliteStore::open_in_memory().unwrap());
    let cache = ResponseCache::new(ResponseCacheConfig::default(), Some(Arc::clone(&db))).unwrap();

    // Seed the durable tier only, as a previous instance would have.
    let key = ResponseCache::key("/api/items", None);
    let entry = CacheEntry::new(key, serde_json::to_vec(&json!(42)).unwrap(), Duration::minutes(5));
    db.put(DURABLE_STORE, &entry).unwrap();
    assert_eq!(cache.memory.len().await, 0);

    assert_eq!(cache.get("/api/items", None).await.unwrap(), Some(json!(42)));
    assert_eq!(cache.memory.len().await, 1);
  }

  #[tokio::test]
  async fn test_memory_eviction_on_set_past_max_size() {
    let cache = tiered_cache(ResponseCacheConfig {
      max_size: 3,
      ..ResponseCacheConfig::default()
    });

    for i in 0..5 {
      cache.set(&format!("/api/{i}"), &json!(i), None, None).await.unwrap();
    }

    let (memory, durable) = cache.entry_counts().await.unwrap();
    assert_eq!(memory, 3);
    // The durable tier keeps everything; only the memory cap applies here.
    assert_eq!(durable, 5);
    assert_eq!(cache.stats().evictions, 2);
  }

  #[tokio::test]
  async fn test_delete_and_clear_mirror_tiers() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    cache.set("/a", &json!(1), None, None).await.unwrap();
    cache.set("/b", &json!(2), None, None).await.unwrap();

    assert!(cache.delete("/a", None).await.unwrap());
    assert_eq!(cache.get("/a", None).await.unwrap(), None);
    let (memory, durable) = cache.entry_counts().await.unwrap();
    assert_eq!((memory, durable), (1, 1));

    cache.clear().await.unwrap();
    let (memory, durable) = cache.entry_counts().await.unwrap();
    assert_eq!((memory, durable), (0, 0));
  }

  #[tokio::test]
  async fn test_cleanup_is_idempotent() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    cache.set("/live", &json!(1), None, None).await.unwrap();
    cache
      .set("/dead", &json!(2), None, Some(Duration::milliseconds(-1)))
      .await
      .unwrap();

    // Both tiers hold the expired entry, so one cleanup removes two rows.
    assert_eq!(cache.cleanup().await.unwrap(), 2);
    assert_eq!(cache.cleanup().await.unwrap(), 0);

    let (memory, durable) = cache.entry_counts().await.unwrap();
    assert_eq!((memory, durable), (1, 1));
  }

  #[tokio::test]
  async fn test_cached_request_hit_skips_network() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    let transport = FakeTransport::json(json!({"ok": true}));
    let req = Request::get("/api/items");

    let first = cache.cached_request(&transport, &req).await.unwrap();
    assert_eq!(first, json!({"ok": true}));
    assert_eq!(transport.call_count(), 1);

    let second = cache.cached_request(&transport, &req).await.unwrap();
    assert_eq!(second, json!({"ok": true}));
    // Hit: the network client was not invoked at all.
    assert_eq!(transport.call_count(), 1);
  }

  #[tokio::test]
  async fn test_cached_request_never_caches_non_read() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    let transport = FakeTransport::json(json!({"ok": true}));
    let mut req = Request::get("/api/items");
    req.method = Method::Post;

    cache.cached_request(&transport, &req).await.unwrap();
    cache.cached_request(&transport, &req).await.unwrap();
    assert_eq!(transport.call_count(), 2);

    let (memory, durable) = cache.entry_counts().await.unwrap();
    assert_eq!((memory, durable), (0, 0));
  }

  #[tokio::test]
  async fn test_cached_request_rejects_non_success() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    let transport = FakeTransport::status(500, b"boom");
    let req = Request::get("/api/items");

    let result = cache.cached_request(&transport, &req).await;
    assert!(matches!(result, Err(Error::Network(_))));

    let (memory, durable) = cache.entry_counts().await.unwrap();
    assert_eq!((memory, durable), (0, 0));
  }

  #[tokio::test]
  async fn test_cached_request_rejects_unparseable_payload() {
    let cache = tiered_cache(ResponseCacheConfig::default());
    let transport = FakeTransport::status(200, b"<html>not json</html>");
    let req = Request::get("/api/items");

    let result = cache.cached_request(&transport, &req).await;
    assert!(matches!(result, Err(Error::InvalidPayload(_))));
  }

  #[tokio::test]
  async fn test_memory_only_configuration() {
    let cache = ResponseCache::new(
      ResponseCacheConfig {
        tiers: TierSelection::memory_only(),
        ..ResponseCacheConfig::default()
      },
      None,
    )
    .unwrap();

    cache.set("/a", &json!(1), None, None).await.unwrap();
    assert_eq!(cache.get("/a", None).await.unwrap(), Some(json!(1)));

    let (memory, durable) = cache.entry_counts().await.unwrap();
    assert_eq!((memory, durable), (1, 0));
  }

  #[test]
  fn test_durable_tier_requires_store() {
    let result = ResponseCache::new(ResponseCacheConfig::default(), None);
    assert!(matches!(result, Err(Error::Config(_))));
  }
}
