//! HTTP fetcher implementation
//!
//! This module handles all requests to the dataset API, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Building block query URLs
//! - Rate-limit handling driven by the provider's reset header
//! - Exponential backoff with jitter for transient failures
//! - Error classification

use crate::config::{ProviderConfig, RetryConfig};
use crate::ingest::{jitter, FetchError, RateLimiter, RawPayload};
use chrono::NaiveDate;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the provider's cooldown in seconds
const RATE_LIMIT_RESET_HEADER: &str = "ratelimit-reset";

/// One block query: a period and a chunk of station ids
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub period: NaiveDate,
    pub stations: &'a [i64],
    pub parameters: &'a [String],
}

impl fmt::Display for FetchRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.stations.first(), self.stations.last()) {
            (Some(first), Some(last)) => write!(
                f,
                "{} stations {}..{} ({})",
                self.period,
                first,
                last,
                self.stations.len()
            ),
            _ => write!(f, "{} (no stations)", self.period),
        }
    }
}

/// Source of block payloads
///
/// The run controller only sees this trait, so tests can script outcomes
/// without a server.
#[allow(async_fn_in_trait)]
pub trait BlockFetcher {
    /// Fetches one block, retrying internally as configured
    async fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<RawPayload, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The provider configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ProviderConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher for the historical station endpoint
///
/// Borrows the run's rate limiter so every attempt, retries included, is
/// counted against the same budget.
pub struct HttpFetcher<'l> {
    client: Client,
    endpoint: Url,
    retry: RetryConfig,
    max_wait: Duration,
    limiter: &'l mut RateLimiter,
    requests_sent: u64,
}

impl<'l> HttpFetcher<'l> {
    /// Creates a fetcher for one dataset
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - API root, e.g. `https://dataset.api.hub.geosphere.at/v1`
    /// * `dataset` - Dataset name appended to `/station/historical/`
    /// * `retry` - Retry and backoff settings
    /// * `max_wait` - Longest cooldown the run is willing to sleep through
    /// * `limiter` - The run's rate limiter
    pub fn new(
        client: Client,
        base_url: &str,
        dataset: &str,
        retry: RetryConfig,
        max_wait: Duration,
        limiter: &'l mut RateLimiter,
    ) -> Result<Self, FetchError> {
        let endpoint = format!(
            "{}/station/historical/{}",
            base_url.trim_end_matches('/'),
            dataset
        );
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", endpoint, e)))?;

        Ok(Self {
            client,
            endpoint,
            retry,
            max_wait,
            limiter,
            requests_sent: 0,
        })
    }

    /// HTTP requests sent so far, retries included
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Query URL for a block; parameter names go upper-case on the wire
    pub fn request_url(&self, request: &FetchRequest<'_>) -> Url {
        let period = request.period.to_string();
        let stations = request
            .stations
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let parameters = request
            .parameters
            .iter()
            .map(|p| p.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(",");

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("start", &period)
            .append_pair("end", &period)
            .append_pair("station_ids", &stations)
            .append_pair("parameters", &parameters);
        url
    }

    /// Cooldown suggested by a 429 response
    fn suggested_wait(&self, headers: &HeaderMap) -> Duration {
        [RATE_LIMIT_RESET_HEADER, "retry-after"]
            .iter()
            .find_map(|name| {
                headers
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
            })
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(self.retry.default_reset_secs))
    }

    /// Delay before the next attempt after a transient failure
    fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .retry
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(exponential)
            + jitter(
                self.retry.backoff_jitter_min_ms,
                self.retry.backoff_jitter_max_ms,
            )
    }
}

impl BlockFetcher for HttpFetcher<'_> {
    /// Fetches one block
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 200 + valid JSON | Return payload |
    /// | HTTP 429, reset > max wait | Immediate → CooldownTooLong |
    /// | HTTP 429 | Sleep reset + jitter, consume a retry |
    /// | Other HTTP 4xx | Immediate → ClientRejected |
    /// | HTTP 5xx, timeout, network, bad body | Backoff base·2^n + jitter, consume a retry |
    ///
    /// Every attempt first acquires a rate-limiter permit. There is no sleep
    /// after the final failed attempt.
    async fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<RawPayload, FetchError> {
        let url = self.request_url(request);
        let mut attempt: u32 = 0;

        loop {
            self.limiter.acquire().await?;
            self.requests_sent += 1;
            debug!("GET {} (attempt {})", url, attempt + 1);

            let failure = match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::OK {
                        match response.json::<RawPayload>().await {
                            Ok(payload) => return Ok(payload),
                            Err(e) => format!("invalid response body: {}", e),
                        }
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        let reset = self.suggested_wait(response.headers());
                        if reset > self.max_wait {
                            return Err(FetchError::CooldownTooLong {
                                suggested: reset,
                                max: self.max_wait,
                            });
                        }
                        if attempt >= self.retry.max_retries {
                            return Err(FetchError::RetriesExhausted {
                                attempts: attempt + 1,
                                last: "HTTP 429".to_string(),
                            });
                        }

                        let wait = reset
                            + jitter(
                                self.retry.rate_limit_jitter_min_ms,
                                self.retry.rate_limit_jitter_max_ms,
                            );
                        warn!("429 for {} - sleeping {:?}", request, wait);
                        sleep(wait).await;
                        attempt += 1;
                        continue;
                    } else if status.is_client_error() {
                        return Err(FetchError::ClientRejected {
                            status: status.as_u16(),
                        });
                    } else {
                        format!("HTTP {}", status.as_u16())
                    }
                }
                Err(e) if e.is_timeout() => "request timeout".to_string(),
                Err(e) if e.is_connect() => format!("connection failed: {}", e),
                Err(e) => e.to_string(),
            };

            if attempt >= self.retry.max_retries {
                return Err(FetchError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: failure,
                });
            }

            let delay = self.backoff(attempt);
            warn!(
                "{} for {} - retry {}/{} in {:?}",
                failure,
                request,
                attempt + 1,
                self.retry.max_retries,
                delay
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
