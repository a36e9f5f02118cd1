//! Rate-limited, cached profile retrieval.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use lineage_shared::{CrawlConfig, Profile, Result};

use crate::parsers::ParserChain;
use crate::source::PageSource;

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Enforces a minimum interval between the starts of consecutive fetches.
///
/// The first acquisition never waits.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Wait until the next fetch may start, then claim the slot.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last {
            let ready_at = last + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// ProfileFetcher
// ---------------------------------------------------------------------------

/// Fetches and parses profiles for a single run.
///
/// Holds the run's read-through cache and rate limiter; `&mut self` on
/// [`fetch_profile`](Self::fetch_profile) keeps at most one request in flight.
pub struct ProfileFetcher<S> {
    source: S,
    parsers: ParserChain,
    cache: HashMap<String, Profile>,
    limiter: RateLimiter,
    transient_retries: u32,
    retry_backoff: Duration,
    network_fetches: usize,
}

impl<S: PageSource> ProfileFetcher<S> {
    pub fn new(source: S, config: &CrawlConfig) -> Self {
        Self {
            source,
            parsers: ParserChain::new(),
            cache: HashMap::new(),
            limiter: RateLimiter::new(Duration::from_millis(config.rate_limit_ms)),
            transient_retries: config.transient_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            network_fetches: 0,
        }
    }

    /// Return the profile for `external_id`, fetching it on a cache miss.
    pub async fn fetch_profile(&mut self, external_id: &str) -> Result<Profile> {
        if let Some(profile) = self.cache.get(external_id) {
            debug!(external_id, "profile cache hit");
            return Ok(profile.clone());
        }

        let html = self.fetch_with_retry(external_id).await?;
        let profile = self.parsers.parse(external_id, &html)?;

        debug!(
            external_id,
            name = %profile.display_name,
            children = profile.children.len(),
            private = profile.is_private,
            "profile parsed"
        );

        self.cache.insert(external_id.to_string(), profile.clone());
        Ok(profile)
    }

    /// Requests sent to the source so far (retries included).
    pub fn network_fetches(&self) -> usize {
        self.network_fetches
    }

    /// Number of profiles currently cached.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_with_retry(&mut self, external_id: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;
            self.network_fetches += 1;

            match self.source.fetch_page(external_id).await {
                Ok(html) => return Ok(html),
                Err(e) if e.is_transient() && attempt < self.transient_retries => {
                    let backoff = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        external_id,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::source::MemoryPageSource;
    use lineage_shared::LineageError;

    fn page(name: &str) -> String {
        format!("<html><body><h1>{name}</h1></body></html>")
    }

    fn config(rate_limit_ms: u64) -> CrawlConfig {
        CrawlConfig {
            rate_limit_ms,
            ..CrawlConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_spaces_sequential_fetches() {
        let source = MemoryPageSource::new()
            .with_page("A-1", page("A"))
            .with_page("B-2", page("B"))
            .with_page("C-3", page("C"));
        let mut fetcher = ProfileFetcher::new(&source, &config(2000));

        let start = Instant::now();
        for id in ["A-1", "B-2", "C-3"] {
            fetcher.fetch_profile(id).await.unwrap();
        }

        // Two enforced gaps between three fetches.
        assert!(start.elapsed() >= Duration::from_millis(4000));
        assert_eq!(fetcher.network_fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_fetch_does_not_wait() {
        let source = MemoryPageSource::new().with_page("A-1", page("A"));
        let mut fetcher = ProfileFetcher::new(&source, &config(2000));

        let start = Instant::now();
        fetcher.fetch_profile("A-1").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hits_skip_source_and_limiter() {
        let source = MemoryPageSource::new().with_page("A-1", page("A"));
        let mut fetcher = ProfileFetcher::new(&source, &config(2000));

        let first = fetcher.fetch_profile("A-1").await.unwrap();
        let start = Instant::now();
        let second = fetcher.fetch_profile("A-1").await.unwrap();

        assert_eq!(first, second);
        assert!(start.elapsed() < Duration::from_millis(2000));
        assert_eq!(source.requests(), vec!["A-1"]);
        assert_eq!(fetcher.cached(), 1);
    }

    #[tokio::test]
    async fn not_found_is_not_cached_or_retried() {
        let source = MemoryPageSource::new();
        let mut fetcher = ProfileFetcher::new(
            &source,
            &CrawlConfig {
                rate_limit_ms: 0,
                transient_retries: 3,
                ..CrawlConfig::default()
            },
        );

        let err = fetcher.fetch_profile("Missing-1").await.unwrap_err();
        assert!(matches!(err, LineageError::NotFound { .. }));
        assert_eq!(source.requests().len(), 1);
        assert_eq!(fetcher.cached(), 0);
    }

    /// Fails with a transient error a fixed number of times, then succeeds.
    struct FlakySource {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl PageSource for FlakySource {
        async fn fetch_page(&self, _external_id: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(LineageError::Network("connection reset".into()));
            }
            Ok(page("Recovered"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_not_retried_by_default() {
        let source = FlakySource {
            failures_left: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
        };
        let mut fetcher = ProfileFetcher::new(&source, &config(0));

        let err = fetcher.fetch_profile("Flaky-1").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_with_backoff_when_enabled() {
        let source = FlakySource {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        };
        let mut fetcher = ProfileFetcher::new(
            &source,
            &CrawlConfig {
                rate_limit_ms: 0,
                transient_retries: 2,
                retry_backoff_ms: 100,
                ..CrawlConfig::default()
            },
        );

        let start = Instant::now();
        let profile = fetcher.fetch_profile("Flaky-1").await.unwrap();
        assert_eq!(profile.display_name, "Recovered");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
