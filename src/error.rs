//! Error types for the caching subsystem.
//!
//! A cache miss is deliberately not part of this taxonomy: lookups return
//! `Option` and a negative result is a normal outcome, not a failure.

use thiserror::Error;

use crate::request::ResourceCategory;

/// Unified error type for cache operations.
#[derive(Debug, Error)]
pub enum Error {
  /// The transport threw or returned a network-level error.
  #[error("network failure: {0}")]
  Network(String),

  /// A tier read or write failed (e.g. durable store unavailable).
  #[error("storage failure: {0}")]
  Storage(String),

  /// No cache entry, no network result, and no fallback defined for this
  /// resource category. The only terminal, user-visible failure.
  #[error("no offline fallback available for {0} requests")]
  NoFallbackAvailable(ResourceCategory),

  /// A response body could not be parsed into the expected shape.
  #[error("invalid payload: {0}")]
  InvalidPayload(String),

  /// The cache definition supplied by the host is unusable.
  #[error("invalid configuration: {0}")]
  Config(String),
}

impl Error {
  /// Shorthand for wrapping storage backend errors.
  pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
    Error::Storage(e.to_string())
  }
}

/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
