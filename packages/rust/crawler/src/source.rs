//! Where profile pages come from.
//!
//! [`HttpPageSource`] talks to the genealogy site; [`MemoryPageSource`]
//! serves pages that were captured earlier (offline replays and tests).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use lineage_shared::{CrawlConfig, ID_PLACEHOLDER, LineageError, Result};

/// User-Agent string for profile requests.
const USER_AGENT: &str = concat!("LineageCrawler/", env!("CARGO_PKG_VERSION"));

/// Retrieves the raw page for one external profile identifier.
///
/// Implementations map an absent page to [`LineageError::NotFound`] and
/// transport trouble to [`LineageError::Network`].
pub trait PageSource: Send + Sync {
    fn fetch_page(&self, external_id: &str) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Fetches profile pages over HTTP(S) from a URL template.
pub struct HttpPageSource {
    client: Client,
    url_template: String,
}

impl HttpPageSource {
    /// Build a source from the crawl configuration.
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LineageError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url_template: config.profile_url_template.clone(),
        })
    }

    /// The page URL for an external identifier.
    pub fn profile_url(&self, external_id: &str) -> Result<Url> {
        let raw = self.url_template.replace(ID_PLACEHOLDER, external_id);
        Url::parse(&raw)
            .map_err(|e| LineageError::parse(format!("invalid profile URL '{raw}': {e}")))
    }
}

impl PageSource for HttpPageSource {
    async fn fetch_page(&self, external_id: &str) -> Result<String> {
        let url = self.profile_url(external_id)?;
        debug!(%url, external_id, "fetching profile");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| LineageError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(LineageError::not_found(external_id));
        }
        if !status.is_success() {
            return Err(LineageError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| LineageError::Network(format!("{url}: body read failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Serves pages from a map; unknown identifiers are `NotFound`.
///
/// Every request is logged so callers can check what was fetched.
#[derive(Default)]
pub struct MemoryPageSource {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the page for an identifier.
    pub fn insert(&mut self, external_id: impl Into<String>, html: impl Into<String>) {
        self.pages.insert(external_id.into(), html.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_page(mut self, external_id: impl Into<String>, html: impl Into<String>) -> Self {
        self.insert(external_id, html);
        self
    }

    /// Identifiers requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl PageSource for MemoryPageSource {
    async fn fetch_page(&self, external_id: &str) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(external_id.to_string());

        self.pages
            .get(external_id)
            .cloned()
            .ok_or_else(|| LineageError::not_found(external_id))
    }
}

impl<S: PageSource> PageSource for &S {
    fn fetch_page(&self, external_id: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).fetch_page(external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CrawlConfig {
        CrawlConfig {
            profile_url_template: format!("{}/wiki/{{id}}", server.uri()),
            rate_limit_ms: 0,
            ..CrawlConfig::default()
        }
    }

    #[test]
    fn builds_profile_urls_from_template() {
        let source = HttpPageSource::new(&CrawlConfig::default()).unwrap();
        let url = source.profile_url("Hopewell-183").unwrap();
        assert_eq!(url.as_str(), "https://www.wikitree.com/wiki/Hopewell-183");
    }

    #[tokio::test]
    async fn fetches_page_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/Hopewell-183"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Jane</h1>"))
            .mount(&server)
            .await;

        let source = HttpPageSource::new(&config_for(&server)).unwrap();
        let body = source.fetch_page("Hopewell-183").await.unwrap();
        assert_eq!(body, "<h1>Jane</h1>");
    }

    #[tokio::test]
    async fn missing_page_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(path("/wiki/Gone-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpPageSource::new(&config_for(&server)).unwrap();
        let err = source.fetch_page("Gone-1").await.unwrap_err();
        assert!(matches!(err, LineageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(path("/wiki/Busy-1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = HttpPageSource::new(&config_for(&server)).unwrap();
        let err = source.fetch_page("Busy-1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn memory_source_logs_requests() {
        let source = MemoryPageSource::new().with_page("A-1", "<h1>A</h1>");
        assert!(source.fetch_page("A-1").await.is_ok());
        assert!(matches!(
            source.fetch_page("B-2").await,
            Err(LineageError::NotFound { .. })
        ));
        assert_eq!(source.requests(), vec!["A-1", "B-2"]);
    }
}
