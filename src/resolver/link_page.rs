//! Lookup-page resolver.
//!
//! Loads an intermediate HTML page for the item and picks the first anchor
//! whose target starts with a configured prefix (for example `get.php`).
//! The match is joined onto the page URL to form the absolute fetch URL.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html};
use tracing::{debug, instrument};
use url::Url;

use super::{ResolveError, Resolver};
use crate::fetch::{FetchTarget, derive_filename};
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::retry::{FailureKind, classify_http_status};
use crate::store::Item;

/// Default anchor prefix that marks the binary link on a lookup page.
pub const DEFAULT_LINK_PREFIX: &str = "get.php";

/// Default connect timeout for lookup pages.
pub const PAGE_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default total timeout for lookup pages.
pub const PAGE_TIMEOUT_SECS: u64 = 15;

/// Placeholder substituted with the item key in page URL templates.
const KEY_PLACEHOLDER: &str = "{key}";

/// Settings for [`LinkPageResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPageConfig {
    /// Anchor targets must start with this (a leading `/` is ignored).
    pub link_prefix: String,
    /// Page URL used when an item has no reference, e.g.
    /// `https://mirror.example/ads.php?md5={key}`.
    pub page_url_template: Option<String>,
    /// Timeouts for the single page request.
    pub timeouts: HttpTimeouts,
    /// Overrides the default User-Agent.
    pub user_agent: Option<String>,
}

impl Default for LinkPageConfig {
    fn default() -> Self {
        Self {
            link_prefix: DEFAULT_LINK_PREFIX.to_string(),
            page_url_template: None,
            timeouts: HttpTimeouts::from_secs(PAGE_CONNECT_TIMEOUT_SECS, PAGE_TIMEOUT_SECS),
            user_agent: None,
        }
    }
}

/// Resolver that scrapes one lookup page per item.
#[derive(Debug, Clone)]
pub struct LinkPageResolver {
    client: Client,
    link_prefix: String,
    page_url_template: Option<String>,
}

impl LinkPageResolver {
    /// Builds a resolver with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn new(config: LinkPageConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config.timeouts, config.user_agent.as_deref())?;
        Ok(Self::with_client(client, config))
    }

    /// Builds a resolver over an existing client; the config timeouts are unused.
    #[must_use]
    pub fn with_client(client: Client, config: LinkPageConfig) -> Self {
        Self {
            client,
            link_prefix: config.link_prefix.trim_start_matches('/').to_string(),
            page_url_template: config.page_url_template,
        }
    }

    /// Returns the lookup page URL for an item.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidReference`] when neither the reference
    /// nor the template yields an absolute URL.
    pub fn page_url(&self, item: &Item) -> Result<Url, ResolveError> {
        let reference = item
            .raw_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let candidate = match (reference, &self.page_url_template) {
            (Some(reference), _) => reference.to_string(),
            (None, Some(template)) => template.replace(KEY_PLACEHOLDER, &item.key),
            (None, None) => {
                return Err(ResolveError::invalid_reference(
                    &item.key,
                    "no reference and no page URL template configured",
                ));
            }
        };

        let url = Url::parse(&candidate).map_err(|e| {
            ResolveError::invalid_reference(&item.key, format!("{candidate}: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ResolveError::invalid_reference(
                &item.key,
                format!("unsupported scheme {}", url.scheme()),
            ));
        }
        Ok(url)
    }

    async fn load_page(&self, key: &str, page_url: &Url) -> Result<String, ResolveError> {
        let url = page_url.as_str();
        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "timed out".to_string()
            } else {
                e.to_string()
            };
            ResolveError::transient(url, reason)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(key, url, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ResolveError::transient(url, format!("failed reading page body: {e}")))
    }
}

fn status_error(key: &str, url: &str, status: u16) -> ResolveError {
    match classify_http_status(status) {
        FailureKind::TransientNetwork => ResolveError::transient(url, format!("HTTP {status}")),
        FailureKind::NotFound | FailureKind::LocalIo => {
            ResolveError::not_found(key, format!("HTTP {status} from {url}"))
        }
    }
}

/// Returns the first anchor in `html` whose target starts with `prefix`,
/// joined onto `page_url`.
#[must_use]
pub fn find_fetch_link(html: &str, page_url: &Url, prefix: &str) -> Option<Url> {
    let prefix = prefix.trim_start_matches('/');
    let document = Html::parse_document(html);

    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name().eq_ignore_ascii_case("a"))
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| href.trim_start_matches('/').starts_with(prefix))
        .find_map(|href| page_url.join(href).ok())
}

#[async_trait]
impl Resolver for LinkPageResolver {
    fn name(&self) -> &'static str {
        "link_page"
    }

    #[instrument(skip(self, item), fields(resolver = "link_page", key = %item.key))]
    async fn resolve(&self, item: &Item) -> Result<FetchTarget, ResolveError> {
        let page_url = self.page_url(item)?;
        let html = self.load_page(&item.key, &page_url).await?;

        let url = find_fetch_link(&html, &page_url, &self.link_prefix).ok_or_else(|| {
            ResolveError::not_found(
                &item.key,
                format!("no link starting with {} on {page_url}", self.link_prefix),
            )
        })?;

        debug!(url = %url, "fetch link found");
        let filename = derive_filename(&item.title, &item.file_type, &item.key);
        Ok(FetchTarget::new(&item.key, url, filename))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::NewItem;

    fn page() -> Url {
        Url::parse("https://mirror.example/ads.php?md5=abc").unwrap()
    }

    fn item(reference: Option<&str>) -> Item {
        Item::from_new(
            1,
            &NewItem::new("abc", "Dune", "epub", reference.map(str::to_string)),
        )
    }

    #[test]
    fn test_find_fetch_link_picks_first_match() {
        let html = r#"<html><body>
            <a href="/index.php">home</a>
            <a href="get.php?md5=abc&key=K1">GET</a>
            <a href="get.php?md5=abc&key=K2">mirror</a>
        </body></html>"#;

        let url = find_fetch_link(html, &page(), "get.php").unwrap();
        assert_eq!(url.as_str(), "https://mirror.example/get.php?md5=abc&key=K1");
    }

    #[test]
    fn test_find_fetch_link_ignores_leading_slash() {
        let html = r#"<a href="/get.php?md5=abc">GET</a>"#;
        let url = find_fetch_link(html, &page(), "get.php").unwrap();
        assert_eq!(url.as_str(), "https://mirror.example/get.php?md5=abc");

        let url = find_fetch_link(r#"<a href="get.php?x=1">x</a>"#, &page(), "/get.php").unwrap();
        assert_eq!(url.path(), "/get.php");
    }

    #[test]
    fn test_find_fetch_link_none_when_absent() {
        let html = r#"<a href="https://other.example/file.pdf">x</a><p>get.php</p>"#;
        assert!(find_fetch_link(html, &page(), "get.php").is_none());
        assert!(find_fetch_link("", &page(), "get.php").is_none());
    }

    #[test]
    fn test_page_url_prefers_reference() {
        let resolver = LinkPageResolver::with_client(
            Client::new(),
            LinkPageConfig {
                page_url_template: Some("https://mirror.example/ads.php?md5={key}".into()),
                ..LinkPageConfig::default()
            },
        );

        let from_reference = resolver
            .page_url(&item(Some("https://other.example/ads.php?md5=abc")))
            .unwrap();
        assert_eq!(from_reference.host_str(), Some("other.example"));

        let from_template = resolver.page_url(&item(None)).unwrap();
        assert_eq!(from_template.as_str(), "https://mirror.example/ads.php?md5=abc");
    }

    #[test]
    fn test_page_url_without_reference_or_template() {
        let resolver = LinkPageResolver::with_client(Client::new(), LinkPageConfig::default());
        let err = resolver.page_url(&item(None)).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidReference { .. }));

        let err = resolver.page_url(&item(Some("not a url"))).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidReference { .. }));
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error("k", "u", 503),
            ResolveError::Transient { .. }
        ));
        assert!(matches!(
            status_error("k", "u", 429),
            ResolveError::Transient { .. }
        ));
        assert!(matches!(status_error("k", "u", 404), ResolveError::NotFound { .. }));
    }
}
