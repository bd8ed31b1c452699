//! Offline-first client caching.
//!
//! Two independent layers:
//!
//! - **Transparent interception** ([`CacheManager`]): every outgoing read
//!   is classified into a resource category and routed through the
//!   strategy bound to that category (cache-first, network-first or
//!   stale-while-revalidate) over generation-tagged durable stores, with
//!   an offline fallback as the terminal resolver.
//! - **Explicit response cache** ([`ResponseCache`]): a tiered
//!   (memory + durable) cache with per-entry TTLs and capacity-bounded
//!   eviction, wrapping specific outbound calls where interception does
//!   not apply.
//!
//! The host runtime drives lifecycle through `on_install` (pre-warm),
//! `on_activate` (purge stale generations) and periodic `housekeeping`.
//!
//! # Example
//!
//! ```ignore
//! use offstage::{CacheConfig, CacheManager, Outcome, Request, ReqwestTransport};
//! use std::sync::Arc;
//!
//! # async fn run() -> offstage::Result<()> {
//! let transport = Arc::new(ReqwestTransport::new("https://app.example.com")?);
//! let manager = CacheManager::new(CacheConfig::load(None)?, transport)?;
//!
//! manager.on_install().await?;
//! manager.on_activate().await?;
//!
//! match manager.on_request(&Request::get("/assets/app.js")).await? {
//!   Outcome::Response(response) => { /* serve response.payload */ }
//!   Outcome::Bypass => { /* go to the network directly */ }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod entry;
mod error;
mod fallback;
mod intercept;
mod manager;
mod request;
mod response_cache;
mod stats;
mod store;
mod strategy;
mod transport;

pub use config::{BindingOverride, CacheConfig};
pub use entry::CacheEntry;
pub use error::{Error, Result};
pub use fallback::OfflineFallback;
pub use intercept::{Classification, Interceptor, StrategyBinding};
pub use manager::{CacheManager, Diagnostics, Outcome, StoreInfo};
pub use request::{Method, Request, RequestIdentity, ResourceCategory};
pub use response_cache::{ResponseCache, ResponseCacheConfig, TierSelection};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{MemoryStore, NamedStore, SqliteStore};
pub use strategy::{CachedResponse, ResponseSource, Strategy, StrategyEngine};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
