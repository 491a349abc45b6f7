//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the collector, including:
//! - Building HTTP clients with the configured identification headers
//! - Running a batch of GET requests through a bounded concurrent pool
//! - Retry with jittered backoff for transient failures
//! - Recording URLs that failed permanently in the failure sink

use crate::config::RequestConfig;
use crate::storage::FailureSink;
use crate::CollectError;
use futures::stream::{self, StreamExt};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default width of the concurrent fetch pool
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 8;

/// Default attempts per URL, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed and random parts of the backoff, in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 2000;
pub const DEFAULT_JITTER_MS: u64 = 2000;

/// Why a URL produced no body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// HTTP 404, never retried
    #[error("not found (HTTP 404)")]
    NotFound,

    /// Any other non-2xx status on the last attempt
    #[error("HTTP status {0}")]
    Status(u16),

    /// Timeout, connection failure, or an unreadable body on the last attempt
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of fetching one URL
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Position of the URL in the request list
    pub index: usize,

    /// The requested URL
    pub url: String,

    /// Number of requests made, including the first
    pub attempts: u32,

    /// Response body, or the failure of the last attempt
    pub result: Result<String, FetchFailure>,
}

impl FetchOutcome {
    /// Response body when the fetch succeeded
    pub fn body(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }

    /// Number of backoff sleeps taken before the outcome was settled
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Retry budget and backoff for one URL
///
/// | Condition                      | Action                                   |
/// |--------------------------------|------------------------------------------|
/// | 2xx                            | Success                                  |
/// | HTTP 404                       | Immediate terminal failure               |
/// | Other status, timeout, connect | Retry after `base_delay + U(0, jitter)`  |
/// | Budget exhausted               | Terminal failure                         |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per URL (at least 1)
    pub max_attempts: u32,

    /// Fixed part of the delay between attempts
    pub base_delay: Duration,

    /// Upper bound of the uniformly random part of the delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            jitter: Duration::from_millis(DEFAULT_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }

    /// A policy that retries immediately, for tests and local endpoints
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Picks the delay before the next attempt
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base_delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.base_delay + Duration::from_millis(extra)
    }
}

/// Builds an HTTP client carrying the configured identification headers
///
/// The User-Agent is always set; `Authorization: Bearer <token>` is added when
/// an access token is configured.
///
/// # Arguments
///
/// * `config` - The request configuration
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(CollectError)` - A header value was invalid or the client failed to build
pub fn build_http_client(config: &RequestConfig, timeout: Duration) -> Result<Client, CollectError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &config.access_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
            CollectError::Header {
                name: AUTHORIZATION.to_string(),
                message: e.to_string(),
            }
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Concurrent GET fetcher with per-URL retry and failure isolation
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    concurrency: usize,
    failures: Arc<dyn FailureSink>,
}

impl Fetcher {
    /// Creates a new fetcher
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client to use
    /// * `policy` - Retry budget and backoff
    /// * `concurrency` - Maximum number of requests in flight
    /// * `failures` - Where permanently failed URLs are recorded
    pub fn new(
        client: Client,
        policy: RetryPolicy,
        concurrency: usize,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            client,
            policy,
            concurrency: concurrency.max(1),
            failures,
        }
    }

    /// Fetches every URL with at most `concurrency` requests in flight
    ///
    /// Outcomes come back in completion order; use `FetchOutcome::index` to
    /// match them to the request list. A failing URL never affects its
    /// siblings.
    pub async fn fetch_all(&self, urls: Vec<String>) -> Vec<FetchOutcome> {
        let fetches = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| self.fetch_indexed(index, url));

        stream::iter(fetches)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Fetches a single URL with the same retry policy
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        self.fetch_indexed(0, url.to_string()).await
    }

    async fn fetch_indexed(&self, index: usize, url: String) -> FetchOutcome {
        let mut attempts = 0;

        let result = loop {
            attempts += 1;

            match self.attempt(&url).await {
                Ok(body) => {
                    tracing::debug!("Fetched {}", url);
                    break Ok(body);
                }
                Err(FetchFailure::NotFound) => break Err(FetchFailure::NotFound),
                Err(failure) if attempts >= self.policy.max_attempts => break Err(failure),
                Err(failure) => {
                    let delay = self.policy.next_delay();
                    tracing::warn!(
                        "Request to {} failed ({}), retry {} of {} in {:?}",
                        url,
                        failure,
                        attempts,
                        self.policy.max_attempts - 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        if let Err(failure) = &result {
            tracing::warn!(
                "Giving up on {} after {} attempt(s): {}",
                url,
                attempts,
                failure
            );
            if let Err(e) = self.failures.record(&url) {
                tracing::error!("Failed to record {} in the failure log: {}", url, e);
            }
        }

        FetchOutcome {
            index,
            url,
            attempts,
            result,
        }
    }

    /// Makes one request and classifies the response
    async fn attempt(&self, url: &str) -> Result<String, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchFailure::NotFound);
        }
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        response.text().await.map_err(classify_error)
    }
}

fn classify_error(e: reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::Transport("request timeout".to_string())
    } else if e.is_connect() {
        FetchFailure::Transport(format!("connection failed: {}", e))
    } else {
        FetchFailure::Transport(e.to_string())
    }
}
