//! HTTP GET with bounded retry and exponential backoff.
//!
//! Transient failures (statuses in the policy forcelist, connect errors,
//! timeouts) are retried up to `max_retries` times, sleeping
//! `backoff_base ^ attempt` seconds between attempts. Any other failure is
//! returned immediately.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use gradesync_shared::{GradeSyncError, PoolConfig, Result, RetryPolicy};

/// User-Agent string for every request.
const USER_AGENT: &str = concat!("gradesync/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// A failed attempt and whether it is worth repeating.
struct AttemptFailure {
    error: GradeSyncError,
    transient: bool,
}

/// Retrying HTTP client. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    /// Build a fetcher with the given timeout and retry policy.
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| GradeSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, policy })
    }

    /// Build a fetcher from the pool configuration.
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Self::new(config.timeout, config.retry.clone())
    }

    /// GET `url` and return the body text.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut attempt: u32 = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    if attempt > 0 {
                        debug!(url, attempt, "fetch succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(failure) if failure.transient && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %failure.error,
                        "transient fetch failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    /// One request, classified.
    async fn fetch_once(&self, url: &str) -> std::result::Result<String, AttemptFailure> {
        debug!(url, "GET");

        let response = self.client.get(url).send().await.map_err(|e| AttemptFailure {
            transient: e.is_connect() || e.is_timeout(),
            error: GradeSyncError::Network(format!("{url}: {e}")),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure {
                transient: self.policy.is_retryable_status(status.as_u16()),
                error: GradeSyncError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                },
            });
        }

        response.text().await.map_err(|e| AttemptFailure {
            transient: e.is_timeout() || e.is_body(),
            error: GradeSyncError::Network(format!("{url}: body read failed: {e}")),
        })
    }
}
