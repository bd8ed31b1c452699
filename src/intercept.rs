//! Request interception: classification and strategy binding.
//!
//! Every outgoing read is classified into a resource category, then routed
//! to the strategy bound to that category. The host-supplied exclude list
//! takes precedence over everything: auth, session and realtime endpoints
//! must never serve cached data.

use std::collections::HashMap;

use chrono::Duration;

use crate::config::CacheConfig;
use crate::request::{Request, ResourceCategory};
use crate::strategy::Strategy;

/// What to do with an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  /// Not eligible for caching; the host goes straight to the network.
  Bypass,
  /// Eligible; route through the strategy bound to this category.
  Category(ResourceCategory),
}

/// Static mapping of a category to its store and strategy.
#[derive(Debug, Clone)]
pub struct StrategyBinding {
  /// Store name without the generation tag (e.g. "static").
  pub store_stem: String,
  pub strategy: Strategy,
  pub ttl: Duration,
}

impl StrategyBinding {
  /// Full store name for the given cache-definition version.
  pub fn store_name(&self, version: &str) -> String {
    format!("{}-{}", self.store_stem, version)
  }
}

/// Classifies requests and resolves their bindings.
pub struct Interceptor {
  exclude_prefixes: Vec<String>,
  api_prefix: String,
  bindings: HashMap<ResourceCategory, StrategyBinding>,
}

impl Interceptor {
  pub fn new(config: &CacheConfig) -> Self {
    let mut bindings = default_bindings();
    for over in &config.overrides {
      if let Some(binding) = bindings.get_mut(&over.category) {
        if let Some(strategy) = over.strategy {
          binding.strategy = strategy;
        }
        if let Some(ttl_secs) = over.ttl_secs {
          binding.ttl = Duration::seconds(ttl_secs as i64);
        }
      }
    }

    Self {
      exclude_prefixes: config.exclude_prefixes.clone(),
      api_prefix: config.api_prefix.clone(),
      bindings,
    }
  }

  /// Classify one request. The exclude list wins over every heuristic,
  /// and anything that is not a read bypasses every cache tier.
  pub fn classify(&self, req: &Request) -> Classification {
    if !req.method.is_read() {
      return Classification::Bypass;
    }

    let path = req.path();
    if self.exclude_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
      return Classification::Bypass;
    }

    Classification::Category(self.categorize(&path))
  }

  fn categorize(&self, path: &str) -> ResourceCategory {
    if path.starts_with(self.api_prefix.as_str()) {
      return ResourceCategory::Api;
    }

    let ext = extension(path).map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
      None => ResourceCategory::Document,
      Some("html") | Some("htm") => ResourceCategory::Document,
      Some("js") | Some("mjs") => ResourceCategory::Script,
      Some("css") => ResourceCategory::Style,
      Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("webp") | Some("svg")
      | Some("ico") | Some("avif") => ResourceCategory::Image,
      Some(_) => ResourceCategory::Other,
    }
  }

  pub fn binding(&self, category: ResourceCategory) -> &StrategyBinding {
    // default_bindings covers every category, so the lookup cannot miss.
    &self.bindings[&category]
  }

  /// Every distinct (store name) the bindings reference, for the given
  /// version. This doubles as the generation whitelist.
  pub fn store_names(&self, version: &str) -> Vec<String> {
    let mut names: Vec<String> = self
      .bindings
      .values()
      .map(|b| b.store_name(version))
      .collect();
    names.sort();
    names.dedup();
    names
  }
}

/// File extension of the last path segment.
fn extension(path: &str) -> Option<&str> {
  let segment = path.rsplit('/').next()?;
  if segment.is_empty() {
    // Trailing slash: a navigation, not a file.
    return None;
  }
  let (_, ext) = segment.rsplit_once('.')?;
  if ext.is_empty() {
    None
  } else {
    Some(ext)
  }
}

fn default_bindings() -> HashMap<ResourceCategory, StrategyBinding> {
  let mut bindings = HashMap::new();
  bindings.insert(
    ResourceCategory::Document,
    StrategyBinding {
      store_stem: "pages".into(),
      strategy: Strategy::NetworkFirst,
      ttl: Duration::days(1),
    },
  );
  bindings.insert(
    ResourceCategory::Script,
    StrategyBinding {
      store_stem: "static".into(),
      strategy: Strategy::StaleWhileRevalidate,
      ttl: Duration::days(7),
    },
  );
  bindings.insert(
    ResourceCategory::Style,
    StrategyBinding {
      store_stem: "static".into(),
      strategy: Strategy::StaleWhileRevalidate,
      ttl: Duration::days(7),
    },
  );
  bindings.insert(
    ResourceCategory::Image,
    StrategyBinding {
      store_stem: "images".into(),
      strategy: Strategy::CacheFirst,
      ttl: Duration::days(30),
    },
  );
  bindings.insert(
    ResourceCategory::Api,
    StrategyBinding {
      store_stem: "api".into(),
      strategy: Strategy::NetworkFirst,
      ttl: Duration::minutes(5),
    },
  );
  bindings.insert(
    ResourceCategory::Other,
    StrategyBinding {
      store_stem: "dynamic".into(),
      strategy: Strategy::StaleWhileRevalidate,
      ttl: Duration::hours(1),
    },
  );
  bindings
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BindingOverride;
  use crate::request::Method;

  fn interceptor() -> Interceptor {
    Interceptor::new(&CacheConfig::default())
  }

  fn category_of(url: &str) -> Classification {
    interceptor().classify(&Request::get(url))
  }

  #[test]
  fn test_extension_heuristics() {
    assert_eq!(category_of("/index.html"), Classification::Category(ResourceCategory::Document));
    assert_eq!(category_of("/"), Classification::Category(ResourceCategory::Document));
    assert_eq!(category_of("/about"), Classification::Category(ResourceCategory::Document));
    assert_eq!(category_of("/assets/app.js"), Classification::Category(ResourceCategory::Script));
    assert_eq!(category_of("/assets/site.css"), Classification::Category(ResourceCategory::Style));
    assert_eq!(category_of("/img/logo.svg"), Classification::Category(ResourceCategory::Image));
    assert_eq!(category_of("/img/photo.jpeg"), Classification::Category(ResourceCategory::Image));
    assert_eq!(category_of("/fonts/inter.woff2"), Classification::Category(ResourceCategory::Other));
  }

  #[test]
  fn test_api_prefix() {
    assert_eq!(category_of("/api/items"), Classification::Category(ResourceCategory::Api));
    // The prefix beats the extension heuristic.
    assert_eq!(category_of("/api/export.css"), Classification::Category(ResourceCategory::Api));
  }

  #[test]
  fn test_absolute_urls_classify_by_path() {
    assert_eq!(
      category_of("https://cdn.example.com/bundle.js?v=2"),
      Classification::Category(ResourceCategory::Script)
    );
  }

  #[test]
  fn test_non_read_bypasses() {
    let i = interceptor();
    let mut req = Request::get("/assets/app.js");
    req.method = Method::Post;
    assert_eq!(i.classify(&req), Classification::Bypass);
  }

  #[test]
  fn test_exclude_list_takes_precedence() {
    // /auth/... would classify as Document, but the exclude list wins.
    assert_eq!(category_of("/auth/login"), Classification::Bypass);
    assert_eq!(category_of("/session/refresh"), Classification::Bypass);
  }

  #[test]
  fn test_binding_override() {
    let config = CacheConfig {
      overrides: vec![BindingOverride {
        category: ResourceCategory::Api,
        strategy: Some(Strategy::StaleWhileRevalidate),
        ttl_secs: Some(30),
      }],
      ..CacheConfig::default()
    };
    let i = Interceptor::new(&config);
    let binding = i.binding(ResourceCategory::Api);
    assert_eq!(binding.strategy, Strategy::StaleWhileRevalidate);
    assert_eq!(binding.ttl, Duration::seconds(30));
    // The store binding itself is static.
    assert_eq!(binding.store_name("v2"), "api-v2");
  }

  #[test]
  fn test_store_names_deduplicate_shared_stores() {
    let names = interceptor().store_names("v1");
    // Script and Style share the "static" store.
    assert_eq!(names, vec!["api-v1", "dynamic-v1", "images-v1", "pages-v1", "static-v1"]);
  }
}
