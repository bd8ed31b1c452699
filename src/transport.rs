//! Network transport abstraction.
//!
//! The cache never talks to the network directly; it goes through a
//! `Transport` so tests can inject mocks and hosts can bring their own
//! client. Timeout behavior is inherited from the transport, the cache
//! layer enforces none of its own.

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};
use crate::request::Request;

/// A network response as seen by the cache: status plus an owned body.
///
/// The body is owned bytes rather than a stream, so storing a copy and
/// returning the payload to the caller are both possible without a
/// read-once hazard.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16, body: Vec<u8>) -> Self {
    Self { status, body }
  }

  /// Only successful (2xx) responses are ever written to a store.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Abstract fetch capability.
#[async_trait]
pub trait Transport: Send + Sync {
  /// Perform the request and return status + body.
  ///
  /// A non-2xx status is a settled response, not an error; `Err` is
  /// reserved for network-level failures (connect, DNS, timeout).
  async fn fetch(&self, req: &Request) -> Result<HttpResponse>;
}

/// Default transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl ReqwestTransport {
  /// Create a transport resolving relative request paths against `base_url`.
  pub fn new(base_url: &str) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| Error::Config(format!("invalid base url {base_url}: {e}")))?;

    Ok(Self {
      client: reqwest::Client::new(),
      base_url,
    })
  }

  fn resolve(&self, url: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(url) {
      return Ok(absolute);
    }
    self
      .base_url
      .join(url)
      .map_err(|e| Error::Config(format!("cannot resolve url {url}: {e}")))
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn fetch(&self, req: &Request) -> Result<HttpResponse> {
    let url = self.resolve(&req.url)?;
    let method = reqwest::Method::from_bytes(req.method.as_str().as_bytes())
      .map_err(|e| Error::Network(e.to_string()))?;

    let mut builder = self.client.request(method, url);

    // Read requests carry params as query pairs, everything else as a body.
    if let Some(params) = &req.params {
      if req.method.is_read() {
        if let Some(map) = params.as_object() {
          let pairs: Vec<(String, String)> = map
            .iter()
            .map(|(k, v)| {
              let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
              };
              (k.clone(), value)
            })
            .collect();
          builder = builder.query(&pairs);
        }
      } else {
        builder = builder.json(params);
      }
    }

    let response = builder
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
      .bytes()
      .await
      .map_err(|e| Error::Network(e.to_string()))?
      .to_vec();

    Ok(HttpResponse::new(status, body))
  }
}
