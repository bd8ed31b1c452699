//! Host-supplied cache definition.
//!
//! The host application describes its caching policy in a YAML file (or
//! constructs the config directly): the definition version, the routes
//! that must always bypass the cache, the assets to pre-warm at install
//! time, and optional per-category strategy overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::request::ResourceCategory;
use crate::strategy::Strategy;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Cache-definition version; store names carry this tag, and bumping it
  /// retires every store of the previous generation on activation.
  #[serde(default = "default_version")]
  pub version: String,

  /// Path prefix identifying API traffic.
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,

  /// Path prefixes that always bypass every cache tier.
  #[serde(default = "default_exclude_prefixes")]
  pub exclude_prefixes: Vec<String>,

  /// URL of the pinned application shell served as the document fallback.
  #[serde(default = "default_shell_url")]
  pub shell_url: String,

  /// Assets to pre-warm on install.
  #[serde(default)]
  pub precache: Vec<String>,

  /// Soft entry-count cap per named store.
  #[serde(default = "default_store_cap")]
  pub store_cap: usize,

  /// Per-category strategy/TTL overrides.
  #[serde(default)]
  pub overrides: Vec<BindingOverride>,
}

/// Override of the default binding for one resource category.
#[derive(Debug, Clone, Deserialize)]
pub struct BindingOverride {
  pub category: ResourceCategory,
  #[serde(default)]
  pub strategy: Option<Strategy>,
  #[serde(default)]
  pub ttl_secs: Option<u64>,
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_api_prefix() -> String {
  "/api/".to_string()
}

fn default_exclude_prefixes() -> Vec<String> {
  ["/auth/", "/session/", "/ws/", "/rpc/"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_shell_url() -> String {
  "/".to_string()
}

fn default_store_cap() -> usize {
  100
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_version(),
      api_prefix: default_api_prefix(),
      exclude_prefixes: default_exclude_prefixes(),
      shell_url: default_shell_url(),
      precache: Vec::new(),
      store_cap: default_store_cap(),
      overrides: Vec::new(),
    }
  }
}

impl CacheConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offstage.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offstage/config.yaml
  ///
  /// With no file found anywhere, the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!("config file not found: {}", p.display())));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offstage.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offstage").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| Error::Config(format!("failed to read config file {}: {e}", path.display())))?;

    let config: CacheConfig = serde_yaml::from_str(&contents)
      .map_err(|e| Error::Config(format!("failed to parse config file {}: {e}", path.display())))?;

    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.is_empty() {
      return Err(Error::Config("version must not be empty".into()));
    }
    if self.store_cap == 0 {
      return Err(Error::Config("store_cap must be at least 1".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.version, "v1");
    assert_eq!(config.store_cap, 100);
    assert!(config.exclude_prefixes.contains(&"/auth/".to_string()));
    assert!(config.precache.is_empty());
  }

  #[test]
  fn test_parse_yaml() {
    let yaml = r#"
version: v3
exclude_prefixes: ["/auth/", "/live/"]
precache:
  - /
  - /styles/main.css
  - /app.js
store_cap: 50
overrides:
  - category: api
    strategy: stale_while_revalidate
    ttl_secs: 60
"#;
    let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.version, "v3");
    assert_eq!(config.precache.len(), 3);
    assert_eq!(config.store_cap, 50);
    assert_eq!(config.overrides.len(), 1);
    assert_eq!(config.overrides[0].category, ResourceCategory::Api);
    assert_eq!(config.overrides[0].strategy, Some(Strategy::StaleWhileRevalidate));
    // Unspecified fields fall back to defaults.
    assert_eq!(config.api_prefix, "/api/");
  }

  #[test]
  fn test_rejects_zero_cap() {
    let yaml = "store_cap: 0";
    let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_err());
  }
}
