//! Cache manager: owns the tiers, the bindings and the lifecycle.
//!
//! The manager is constructed explicitly and injected into consumers; there
//! are no module-level singletons, so tests run any number of isolated
//! instances. The host runtime drives it through three hooks: `on_install`
//! (pre-warm), `on_activate` (generation purge + sweep) and `on_request`
//! (interception). `housekeeping` may additionally run from a periodic or
//! idle timer.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::fallback::OfflineFallback;
use crate::intercept::{Classification, Interceptor};
use crate::request::{Request, RequestIdentity, ResourceCategory};
use crate::stats::{CacheStats, StatsSnapshot};
use crate::store::{NamedStore, SqliteStore};
use crate::strategy::{CachedResponse, StrategyEngine};
use crate::transport::Transport;

/// Result of intercepting one request.
#[derive(Debug)]
pub enum Outcome {
  /// The request is not eligible for caching; the host performs the
  /// network call itself.
  Bypass,
  /// The bound strategy produced a response.
  Response(CachedResponse),
}

/// Per-store entry counts plus the shared counters.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
  pub stores: Vec<StoreInfo>,
  pub counters: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
  pub name: String,
  pub entries: usize,
  pub cap: usize,
}

/// Orchestrates interception, strategies, storage and housekeeping.
pub struct CacheManager {
  config: CacheConfig,
  interceptor: Interceptor,
  engine: StrategyEngine,
  stats: CacheStats,
  stores: HashMap<String, NamedStore>,
  transport: Arc<dyn Transport>,
  db: Arc<SqliteStore>,
}

impl CacheManager {
  /// Create a manager over the default durable store location.
  pub fn new(config: CacheConfig, transport: Arc<dyn Transport>) -> Result<Self> {
    let db = Arc::new(SqliteStore::open()?);
    Self::with_store(config, transport, db)
  }

  /// Create a manager over an explicit durable store. Tests use this with
  /// an in-memory store for isolation.
  pub fn with_store(
    config: CacheConfig,
    transport: Arc<dyn Transport>,
    db: Arc<SqliteStore>,
  ) -> Result<Self> {
    let interceptor = Interceptor::new(&config);
    let stats = CacheStats::new();

    let mut stores = HashMap::new();
    for name in interceptor.store_names(&config.version) {
      db.register_store(&name, &config.version)?;
      stores.insert(name.clone(), NamedStore::new(name, config.store_cap, Arc::clone(&db)));
    }

    let pages_name = interceptor
      .binding(ResourceCategory::Document)
      .store_name(&config.version);
    let shell_key = RequestIdentity::derive(crate::request::Method::Get, &config.shell_url, None);
    let fallback = OfflineFallback::new(
      stores[&pages_name].clone(),
      shell_key,
    );

    let engine = StrategyEngine::new(Arc::clone(&transport), Arc::new(fallback), stats.clone());

    Ok(Self {
      config,
      interceptor,
      engine,
      stats,
      stores,
      transport,
      db,
    })
  }

  /// Interception entry point: classify, bind, execute.
  pub async fn on_request(&self, req: &Request) -> Result<Outcome> {
    let category = match self.interceptor.classify(req) {
      Classification::Bypass => {
        debug!(url = %req.url, "bypassing cache");
        return Ok(Outcome::Bypass);
      }
      Classification::Category(category) => category,
    };

    let binding = self.interceptor.binding(category);
    let store = &self.stores[&binding.store_name(&self.config.version)];
    let response = self
      .engine
      .execute(binding.strategy, store, req, binding.ttl, category)
      .await?;

    Ok(Outcome::Response(response))
  }

  /// Pre-warm the precache manifest. Individual failures are logged and
  /// skipped; returns the number of assets actually stored.
  pub async fn on_install(&self) -> Result<usize> {
    let mut warmed = 0;

    for url in &self.config.precache {
      let req = Request::get(url.clone());
      let category = match self.interceptor.classify(&req) {
        Classification::Category(category) => category,
        Classification::Bypass => {
          warn!(url = %url, "precache asset matches an exclude prefix, skipping");
          continue;
        }
      };

      let binding = self.interceptor.binding(category);
      let store = &self.stores[&binding.store_name(&self.config.version)];

      match self.transport.fetch(&req).await {
        Ok(response) if response.is_ok() => {
          let entry = CacheEntry::new(req.identity(), response.body, binding.ttl);
          match store.put(&entry) {
            Ok(()) => warmed += 1,
            Err(e) => warn!(url = %url, error = %e, "precache write failed"),
          }
        }
        Ok(response) => warn!(url = %url, status = response.status, "precache fetch returned non-success"),
        Err(e) => warn!(url = %url, error = %e, "precache fetch failed"),
      }
    }

    info!(warmed, total = self.config.precache.len(), "install pre-warm complete");
    self.housekeeping().await?;
    Ok(warmed)
  }

  /// Activate this cache definition: purge every store whose name is not
  /// in the current whitelist, then run a housekeeping pass.
  pub async fn on_activate(&self) -> Result<()> {
    let mut whitelist: Vec<String> = self.stores.keys().cloned().collect();
    // The response cache lives outside the generation scheme.
    whitelist.push(crate::response_cache::DURABLE_STORE.to_string());
    let purged = self.db.purge_except(&whitelist)?;
    if !purged.is_empty() {
      info!(?purged, "purged stale cache generations");
    }

    self.housekeeping().await?;
    Ok(())
  }

  /// One housekeeping pass over every named store: TTL sweep plus capacity
  /// trim, and a reap of settled revalidation handles. Runs as background
  /// work and never blocks in-flight request handling.
  pub async fn housekeeping(&self) -> Result<usize> {
    let mut removed = 0;
    for store in self.stores.values() {
      removed += store.housekeep()?;
    }
    if removed > 0 {
      self.stats.record_evictions(removed as u64);
      debug!(removed, "housekeeping sweep");
    }

    self.engine.reap_revalidations().await;
    Ok(removed)
  }

  /// Current entry counts per store plus hit/miss counters.
  pub fn diagnostics(&self) -> Result<Diagnostics> {
    let mut stores: Vec<StoreInfo> = Vec::with_capacity(self.stores.len());
    for store in self.stores.values() {
      stores.push(StoreInfo {
        name: store.name().to_string(),
        entries: store.count()?,
        cap: store.cap(),
      });
    }
    stores.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Diagnostics {
      stores,
      counters: self.stats.snapshot(),
    })
  }

  pub fn stats(&self) -> StatsSnapshot {
    self.stats.snapshot()
  }

  /// Wait for in-flight background revalidations to settle. Tests and
  /// orderly shutdown use this; normal operation never does.
  pub async fn drain_revalidations(&self) {
    self.engine.drain_revalidations().await;
  }
}
