//! Request model: methods, identities and resource categories.
//!
//! A `RequestIdentity` is the unique cache key for a request. It is derived
//! deterministically from the method, the normalized URL and (for the
//! response cache) an optional parameter object, so the same logical request
//! always maps to the same stored entry.

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// HTTP-style request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
  Patch,
}

impl Method {
  /// Only read-equivalent requests are cacheable.
  pub fn is_read(&self) -> bool {
    matches!(self, Method::Get | Method::Head)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
    }
  }
}

/// An outgoing read request as seen by the cache.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  /// Absolute URL or host-relative path (e.g. "/styles/main.css").
  pub url: String,
  /// Parameter object, used by the response cache to disambiguate calls
  /// that share a URL.
  pub params: Option<serde_json::Value>,
}

impl Request {
  /// Convenience constructor for a GET request without parameters.
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      params: None,
    }
  }

  pub fn with_params(mut self, params: serde_json::Value) -> Self {
    self.params = Some(params);
    self
  }

  /// The path component of the URL, used for classification.
  ///
  /// Absolute URLs are parsed; anything unparseable is treated as a
  /// host-relative path as-is, with query and fragment stripped.
  pub fn path(&self) -> String {
    if let Ok(parsed) = url::Url::parse(&self.url) {
      return parsed.path().to_string();
    }

    let path = self.url.as_str();
    let path = path.split('#').next().unwrap_or(path);
    let path = path.split('?').next().unwrap_or(path);
    path.to_string()
  }

  /// Derive the cache key for this request.
  pub fn identity(&self) -> RequestIdentity {
    RequestIdentity::derive(self.method, &self.url, self.params.as_ref())
  }
}

/// Stable, fixed-length cache key for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity(String);

impl RequestIdentity {
  /// Derive an identity from (method, url, params).
  ///
  /// The parameter object is serialized with sorted keys (serde_json's
  /// default map ordering), so logically equal parameter objects hash to
  /// the same identity regardless of construction order.
  pub fn derive(method: Method, url: &str, params: Option<&serde_json::Value>) -> Self {
    let params_repr = params
      .map(|p| serde_json::to_string(p).unwrap_or_default())
      .unwrap_or_default();
    let input = format!("{}:{}:{}", method.as_str(), normalize_url(url), params_repr);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    Self(hex::encode(result))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for RequestIdentity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Strip the fragment and surrounding whitespace so equivalent URLs share a key.
fn normalize_url(url: &str) -> String {
  let url = url.split('#').next().unwrap_or(url);
  url.trim().to_string()
}

/// Resource category assigned once at classification time.
///
/// Carried explicitly through the pipeline rather than re-derived at each
/// step; the strategy binding and the offline fallback both key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
  Document,
  Script,
  Style,
  Image,
  Api,
  Other,
}

impl std::fmt::Display for ResourceCategory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      ResourceCategory::Document => "document",
      ResourceCategory::Script => "script",
      ResourceCategory::Style => "style",
      ResourceCategory::Image => "image",
      ResourceCategory::Api => "api",
      ResourceCategory::Other => "other",
    };
    f.write_str(name)
  }
}

impl ResourceCategory {
  pub const ALL: [ResourceCategory; 6] = [
    ResourceCategory::Document,
    ResourceCategory::Script,
    ResourceCategory::Style,
    ResourceCategory::Image,
    ResourceCategory::Api,
    ResourceCategory::Other,
  ];
}
