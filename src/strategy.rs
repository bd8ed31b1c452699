//! Per-request caching strategies over a named store and a transport.
//!
//! Each strategy is a small decision procedure:
//!
//! - cache-first: serve a valid cached entry without touching the network;
//!   fetch and store on miss.
//! - network-first: always try the network; degrade to the cache, then to
//!   the offline fallback.
//! - stale-while-revalidate: serve whatever is cached immediately and
//!   refresh it in the background.
//!
//! A network response with a non-2xx status is returned to the caller but
//! never written to a store.

use std::sync::Arc;

use chrono::Duration;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::fallback::OfflineFallback;
use crate::request::{Request, ResourceCategory};
use crate::stats::CacheStats;
use crate::store::NamedStore;
use crate::transport::{HttpResponse, Transport};

/// Caching strategy applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network.
  Network,
  /// Served from a store within its TTL.
  Cache,
  /// Served from a store while a background refresh is in flight.
  Revalidating,
  /// Served stale from a store because the network was unavailable.
  Offline,
  /// Served by the offline fallback resolver.
  Fallback,
}

/// A response produced by the strategy engine.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub status: u16,
  pub payload: Vec<u8>,
  pub source: ResponseSource,
}

impl CachedResponse {
  pub fn new(status: u16, payload: Vec<u8>, source: ResponseSource) -> Self {
    Self {
      status,
      payload,
      source,
    }
  }

  fn from_entry(entry: CacheEntry, source: ResponseSource) -> Self {
    Self::new(200, entry.payload, source)
  }
}

/// Executes strategies against stores and the network transport.
pub struct StrategyEngine {
  transport: Arc<dyn Transport>,
  fallback: Arc<OfflineFallback>,
  stats: CacheStats,
  /// Handles of in-flight background revalidations. They run to completion
  /// or fail; failures are logged, never surfaced, since the caller already
  /// received a response.
  revalidations: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl StrategyEngine {
  pub fn new(transport: Arc<dyn Transport>, fallback: Arc<OfflineFallback>, stats: CacheStats) -> Self {
    Self {
      transport,
      fallback,
      stats,
      revalidations: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Run one strategy for one request against its bound store.
  pub async fn execute(
    &self,
    strategy: Strategy,
    store: &NamedStore,
    req: &Request,
    ttl: Duration,
    category: ResourceCategory,
  ) -> Result<CachedResponse> {
    match strategy {
      Strategy::CacheFirst => self.cache_first(store, req, ttl, category).await,
      Strategy::NetworkFirst => self.network_first(store, req, ttl, category).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(store, req, ttl, category).await,
    }
  }

  async fn cache_first(
    &self,
    store: &NamedStore,
    req: &Request,
    ttl: Duration,
    category: ResourceCategory,
  ) -> Result<CachedResponse> {
    let key = req.identity();

    if let Some(entry) = store.get(&key)? {
      if entry.is_valid() {
        self.stats.record_hit();
        debug!(url = %req.url, store = store.name(), "cache-first hit");
        return Ok(CachedResponse::from_entry(entry, ResponseSource::Cache));
      }
    }
    self.stats.record_miss();

    match self.transport.fetch(req).await {
      Ok(response) => {
        self.store_if_ok(store, &key, &response, ttl);
        Ok(CachedResponse::new(response.status, response.body, ResponseSource::Network))
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "cache-first network failure, degrading");
        // An expired entry still beats nothing when the network is gone.
        if let Some(entry) = store.get(&key)? {
          return Ok(CachedResponse::from_entry(entry, ResponseSource::Offline));
        }
        self.fallback.resolve(category)
      }
    }
  }

  async fn network_first(
    &self,
    store: &NamedStore,
    req: &Request,
    ttl: Duration,
    category: ResourceCategory,
  ) -> Result<CachedResponse> {
    let key = req.identity();

    match self.transport.fetch(req).await {
      Ok(response) => {
        self.store_if_ok(store, &key, &response, ttl);
        Ok(CachedResponse::new(response.status, response.body, ResponseSource::Network))
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "network-first failure, degrading to cache");
        match store.get(&key)? {
          Some(entry) => {
            self.stats.record_hit();
            Ok(CachedResponse::from_entry(entry, ResponseSource::Offline))
          }
          None => {
            self.stats.record_miss();
            self.fallback.resolve(category)
          }
        }
      }
    }
  }

  async fn stale_while_revalidate(
    &self,
    store: &NamedStore,
    req: &Request,
    ttl: Duration,
    category: ResourceCategory,
  ) -> Result<CachedResponse> {
    let key = req.identity();

    if let Some(entry) = store.get(&key)? {
      self.stats.record_hit();
      self.spawn_revalidation(store.clone(), req.clone(), ttl).await;
      return Ok(CachedResponse::from_entry(entry, ResponseSource::Revalidating));
    }
    self.stats.record_miss();

    match self.transport.fetch(req).await {
      Ok(response) => {
        self.store_if_ok(store, &key, &response, ttl);
        Ok(CachedResponse::new(response.status, response.body, ResponseSource::Network))
      }
      Err(_) => self.fallback.resolve(category),
    }
  }

  /// Write a successful response to the store, cloning the body so the
  /// caller still receives it. A storage failure means only "this response
  /// will not be cached this time" and never blocks the response.
  fn store_if_ok(&self, store: &NamedStore, key: &crate::request::RequestIdentity, response: &HttpResponse, ttl: Duration) {
    if !response.is_ok() {
      return;
    }
    let entry = CacheEntry::new(key.clone(), response.body.clone(), ttl);
    if let Err(e) = store.put(&entry) {
      warn!(store = store.name(), error = %e, "response will not be cached");
    }
  }

  /// Spawn the background refresh for stale-while-revalidate.
  ///
  /// The task is tracked by handle; there is no cancellation token, it
  /// runs to completion or fails.
  async fn spawn_revalidation(&self, store: NamedStore, req: Request, ttl: Duration) {
    let transport = Arc::clone(&self.transport);
    let stats = self.stats.clone();
    let key = req.identity();

    let handle = tokio::spawn(async move {
      match transport.fetch(&req).await {
        Ok(response) if response.is_ok() => {
          let entry = CacheEntry::new(key, response.body, ttl);
          match store.put(&entry) {
            Ok(()) => {
              stats.record_revalidation();
              debug!(url = %req.url, store = store.name(), "revalidated");
            }
            Err(e) => warn!(url = %req.url, error = %e, "revalidation write failed"),
          }
        }
        Ok(response) => {
          warn!(url = %req.url, status = response.status, "revalidation returned non-success, keeping cached value");
        }
        Err(e) => {
          warn!(url = %req.url, error = %e, "revalidation fetch failed");
        }
      }
    });

    self.revalidations.lock().await.push(handle);
  }

  /// Number of revalidation tasks not yet reaped.
  pub async fn pending_revalidations(&self) -> usize {
    self.revalidations.lock().await.len()
  }

  /// Drop handles of revalidations that already settled.
  pub async fn reap_revalidations(&self) {
    self.revalidations.lock().await.retain(|handle| !handle.is_finished());
  }

  /// Wait for every in-flight revalidation to settle. Used by tests and
  /// orderly shutdown.
  pub async fn drain_revalidations(&self) {
    let handles: Vec<JoinHandle<()>> = self.revalidations.lock().await.drain(..).collect();
    for handle in handles {
      let _ = handle.await;
    }
  }
}
