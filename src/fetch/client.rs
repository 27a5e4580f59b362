//! HTTP client wrapper for the listing API.
//!
//! This module provides the [`FetchClient`] struct which issues JSON GET
//! requests with the deployment's default headers, a per-request timeout,
//! adaptive throttling and automatic retry on transient failures.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sreality_crawler::fetch::{AutoThrottle, FetchClient, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FetchClient::new(
//!     RetryPolicy::default(),
//!     Arc::new(AutoThrottle::default()),
//! )?;
//! let body = client.fetch_json("https://www.sreality.cz/api/cs/v2/estates?per_page=1").await?;
//! println!("result_size = {:?}", body.get("result_size"));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::throttle::AutoThrottle;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User-Agent the upstream API is known to accept.
///
/// The API rejects obvious bot agents; this mirrors the mobile browser
/// profile the original deployment crawled with.
const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36";

/// Referer sent with every request.
const REFERER: &str = "https://www.sreality.cz/hledani/prodej/byty/praha";

/// HTTP client for fetching API pages as JSON.
///
/// Created once and shared (it is cheap to clone; the inner reqwest client
/// pools connections). Every fetch goes through the shared [`AutoThrottle`]
/// and the configured [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    policy: RetryPolicy,
    throttle: Arc<AutoThrottle>,
}

impl FetchClient {
    /// Creates a new fetch client with the default 30 second timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the underlying HTTP client cannot
    /// be constructed (an invalid TLS environment, typically).
    pub fn new(policy: RetryPolicy, throttle: Arc<AutoThrottle>) -> Result<Self, FetchError> {
        Self::with_timeout(policy, throttle, DEFAULT_TIMEOUT)
    }

    /// Creates a new fetch client with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn with_timeout(
        policy: RetryPolicy,
        throttle: Arc<AutoThrottle>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .default_headers(default_headers())
            .build()
            .map_err(|e| FetchError::network("<client construction>", e))?;

        Ok(Self {
            client,
            policy,
            throttle,
        })
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a URL and parses the body as JSON, retrying transient failures.
    ///
    /// Each attempt acquires the throttle, measures latency and feeds it
    /// back so the delay adapts. Non-2xx statuses and body parse failures
    /// are classified; transient failures are retried with exponential
    /// backoff up to the policy's attempt bound.
    ///
    /// # Errors
    ///
    /// Returns the final [`FetchError`] once retries are exhausted or the
    /// failure is permanent.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(url, attempt, "fetching page");

            self.throttle.acquire().await;

            let started = Instant::now();
            let result = self.fetch_once(url).await;
            let latency = started.elapsed();

            match result {
                Ok(body) => {
                    self.throttle.record_response(latency, true).await;
                    return Ok(body);
                }
                Err(e) => {
                    self.throttle.record_response(latency, false).await;

                    let failure_type = classify_error(&e);
                    match self.policy.should_retry(failure_type, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            info!(
                                url,
                                attempt = next_attempt,
                                max_attempts = self.policy.max_attempts(),
                                delay_ms = delay.as_millis(),
                                error = %e,
                                "retrying fetch"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            warn!(url, %reason, error = %e, "giving up on fetch");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Issues a single GET request and parses the body.
    async fn fetch_once(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        response.json::<serde_json::Value>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::malformed_body(url, e.to_string())
            }
        })
    }
}

/// Builds the default header set sent with every request.
///
/// Mirrors the original deployment's request profile; the API serves JSON
/// to browser-looking clients only.
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en,cs;q=0.9"),
    );
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(USER_AGENT),
    );
    headers.insert(reqwest::header::REFERER, HeaderValue::from_static(REFERER));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers
}
