//! Terminal offline fallback.
//!
//! Invoked only when both the relevant store and the network path have
//! come up empty. Documents resolve to the pinned application shell,
//! images to a fixed placeholder; everything else is a typed failure.

use crate::error::{Error, Result};
use crate::request::{RequestIdentity, ResourceCategory};
use crate::store::NamedStore;
use crate::strategy::{CachedResponse, ResponseSource};

/// Placeholder served for image requests when nothing else is available.
const PLACEHOLDER_IMAGE: &[u8] = br##"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="64" viewBox="0 0 64 64"><rect width="64" height="64" fill="#e0e0e0"/><path d="M16 44l10-12 8 9 6-7 8 10z" fill="#9e9e9e"/><circle cx="24" cy="22" r="5" fill="#9e9e9e"/></svg>"##;

/// Offline fallback resolver.
pub struct OfflineFallback {
  /// Store holding the pinned application shell.
  pages: NamedStore,
  /// Key of the "home" entry used as the shell for document requests.
  shell_key: RequestIdentity,
  placeholder_image: Vec<u8>,
}

impl OfflineFallback {
  pub fn new(pages: NamedStore, shell_key: RequestIdentity) -> Self {
    Self {
      pages,
      shell_key,
      placeholder_image: PLACEHOLDER_IMAGE.to_vec(),
    }
  }

  /// Override the placeholder asset served for image requests.
  pub fn with_placeholder_image(mut self, placeholder: Vec<u8>) -> Self {
    self.placeholder_image = placeholder;
    self
  }

  /// Resolve a fallback response for the given category.
  ///
  /// A category with no defined fallback is a terminal, typed failure --
  /// never a silent empty result.
  pub fn resolve(&self, category: ResourceCategory) -> Result<CachedResponse> {
    match category {
      ResourceCategory::Document => match self.pages.get(&self.shell_key)? {
        Some(entry) => Ok(CachedResponse::new(200, entry.payload, ResponseSource::Fallback)),
        None => Err(Error::NoFallbackAvailable(category)),
      },
      ResourceCategory::Image => Ok(CachedResponse::new(
        200,
        self.placeholder_image.clone(),
        ResponseSource::Fallback,
      )),
      other => Err(Error::NoFallbackAvailable(other)),
    }
  }
}
