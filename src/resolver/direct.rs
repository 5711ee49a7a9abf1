//! Direct resolver: the reference already is the binary URL.

use async_trait::async_trait;
use url::Url;

use super::{ResolveError, Resolver};
use crate::fetch::{FetchTarget, derive_filename};
use crate::store::Item;

/// Resolver for catalogs whose references point straight at the file.
///
/// Validates the reference and performs no network traffic.
#[derive(Debug, Default)]
pub struct DirectResolver;

impl DirectResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[tracing::instrument(skip(self, item), fields(resolver = "direct", key = %item.key))]
    async fn resolve(&self, item: &Item) -> Result<FetchTarget, ResolveError> {
        let reference = item
            .raw_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ResolveError::invalid_reference(&item.key, "no reference"))?;

        let url = Url::parse(reference)
            .map_err(|e| ResolveError::invalid_reference(&item.key, format!("{reference}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ResolveError::invalid_reference(
                &item.key,
                format!("unsupported scheme {}", url.scheme()),
            ));
        }

        let filename = derive_filename(&item.title, &item.file_type, &item.key);
        Ok(FetchTarget::new(&item.key, url, filename))
    }
}
