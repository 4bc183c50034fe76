//! HTTP fetcher with rate limiting and retries
//!
//! Shared by the listing source and the post fetcher:
//! - User-Agent rotation, or a fixed agent from configuration
//! - Raw request ceiling with governor
//! - Retry with exponential backoff for transient failures

use crate::config::CrawlerConfig;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Page fetcher for the listing site
pub struct HttpFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Ceiling on raw requests, retries included
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    retry: RetryConfig,

    /// Fixed user agent; rotates through [`USER_AGENTS`] when unset
    user_agent: Option<HeaderValue>,
}

impl HttpFetcher {
    /// Create a new fetcher with default settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(requests_per_second: u32) -> Result<Self, FetchError> {
        Self::with_config(requests_per_second, 2, Duration::from_secs(30))
    }

    /// Create a new fetcher with custom configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        requests_per_second: u32,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            retry: RetryConfig::new(max_retries),
            user_agent: None,
        })
    }

    /// Create a fetcher from the crawler section of the configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created, or
    /// `FetchError::InvalidUrl` if the configured user agent is not a valid
    /// header value
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let mut fetcher = Self::with_config(
            config.requests_per_second,
            config.max_retries,
            Duration::from_secs(config.request_timeout_secs),
        )?;

        if let Some(agent) = &config.user_agent {
            let value = HeaderValue::from_str(agent)
                .map_err(|_| FetchError::InvalidUrl(format!("bad user agent: {agent}")))?;
            fetcher.user_agent = Some(value);
        }

        Ok(fetcher)
    }

    /// Override backoff delays, mostly useful to keep tests fast
    #[must_use]
    pub fn with_retry_delays(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.retry = RetryConfig::with_delays(self.retry.max_retries, base_delay_ms, max_delay_ms);
        self
    }

    /// Fetch a page body, retrying transient failures
    ///
    /// # Errors
    ///
    /// `FetchError::ServerError` carries the status of a non-2xx response;
    /// 404 and 410 are returned on the first attempt.
    pub async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        with_retry_if(
            &self.retry,
            || self.fetch_once(url.clone()),
            FetchError::is_recoverable,
        )
        .await
    }

    async fn fetch_once(&self, url: reqwest::Url) -> Result<String, FetchError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url.clone())
            .headers(self.build_headers())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Non-success response");
            return Err(FetchError::ServerError(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| HeaderValue::from_static(random_user_agent()));
        headers.insert(USER_AGENT, user_agent);

        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-CA,en;q=0.9"));

        headers
    }
}

fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}
