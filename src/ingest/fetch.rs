// src/ingest/fetch.rs
//! Feed retrieval over HTTP.
//!
//! [`HttpFetcher`] owns one `reqwest::Client` (and so one connection pool) for
//! the whole run. Transient failures are retried according to an explicit
//! [`RetryPolicy`]; all waiting goes through a [`Pause`] so tests can record
//! delays instead of sleeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method, Url};

/// Accept header favouring feed media types.
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(120);

pub fn default_user_agent() -> String {
    format!("feed-harvester/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub polite_delay: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 4,
            backoff_factor: 0.6,
            polite_delay: Duration::from_millis(400),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff_factor)
    }
}

/// Which failures are retried, and how long to wait in between.
///
/// The delay before retry `n` (1-based) is zero for the first retry and
/// `backoff_factor * 2^(n-1)` afterwards, capped at `backoff_max`. A
/// `Retry-After` value sent with 429/503 replaces the computed delay (same
/// cap). Only idempotent methods are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_factor: f64,
    backoff_max: Duration,
    statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        FetchConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff_factor: if backoff_factor.is_finite() {
                backoff_factor.max(0.0)
            } else {
                0.0
            },
            backoff_max: DEFAULT_BACKOFF_MAX,
            statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }

    #[must_use]
    pub fn with_backoff_max(mut self, backoff_max: Duration) -> Self {
        self.backoff_max = backoff_max;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }

    pub fn allows_method(&self, method: &Method) -> bool {
        *method == Method::GET || *method == Method::HEAD
    }

    /// Computed delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let exp = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let secs = self.backoff_factor * 2f64.powi(exp);
        if !secs.is_finite() || secs >= self.backoff_max.as_secs_f64() {
            return self.backoff_max;
        }
        Duration::from_millis((secs * 1_000.0).round() as u64)
    }

    /// Delay actually waited, honouring a server-provided `Retry-After`.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(d) => d.min(self.backoff_max),
            None => self.backoff(retry),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid feed URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Sleep seam.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Retrieve the raw feed document at `url`.
    /// The caller decides what a failure means; the collector logs it and
    /// treats the feed as empty.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<T: FeedFetcher + ?Sized> FeedFetcher for &T {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(url).await
    }
}

enum Attempt {
    Done(Vec<u8>),
    Retry(FetchError, Option<Duration>),
    Fail(FetchError),
}

pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
    polite_delay: Duration,
    pause: Arc<dyn Pause>,
    started: AtomicBool,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            policy: config.retry_policy(),
            polite_delay: config.polite_delay,
            pause: Arc::new(TokioPause),
            started: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Wait `polite_delay` before every request except the first one.
    async fn polite_pause(&self) {
        if self.started.swap(true, Ordering::SeqCst) && !self.polite_delay.is_zero() {
            self.pause.pause(self.polite_delay).await;
        }
    }

    async fn attempt(&self, method: Method, url: &Url) -> Attempt {
        let resp = match self.client.request(method, url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let transient = e.is_connect() || e.is_timeout() || e.is_request() || e.is_body();
                let err = FetchError::Request {
                    url: url.to_string(),
                    source: e,
                };
                return if transient {
                    Attempt::Retry(err, None)
                } else {
                    Attempt::Fail(err)
                };
            }
        };

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return match resp.bytes().await {
                Ok(body) => Attempt::Done(body.to_vec()),
                // connection dropped mid-body
                Err(e) => Attempt::Retry(
                    FetchError::Request {
                        url: url.to_string(),
                        source: e,
                    },
                    None,
                ),
            };
        }

        let err = FetchError::Status {
            url: url.to_string(),
            status,
        };
        if !self.policy.is_retryable_status(status) {
            return Attempt::Fail(err);
        }
        let retry_after = if matches!(status, 429 | 503) {
            parse_retry_after(resp.headers())
        } else {
            None
        };
        Attempt::Retry(err, retry_after)
    }

    async fn request_with_retry(&self, method: Method, url: Url) -> Result<Vec<u8>, FetchError> {
        let may_retry = self.policy.allows_method(&method);
        let mut retry = 0u32;
        loop {
            let (err, retry_after) = match self.attempt(method.clone(), &url).await {
                Attempt::Done(body) => return Ok(body),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry(err, retry_after) => (err, retry_after),
            };

            if !may_retry || retry >= self.policy.max_retries() {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: retry + 1,
                    last: Box::new(err),
                });
            }

            retry += 1;
            let delay = self.policy.delay_for(retry, retry_after);
            counter!("harvest_fetch_retries_total").increment(1);
            tracing::debug!(
                url = %url,
                retry,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient fetch failure, retrying"
            );
            self.pause.pause(delay).await;
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        self.polite_pause().await;

        let t0 = Instant::now();
        let out = self.request_with_retry(Method::GET, parsed).await;
        histogram!("harvest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if let Ok(body) = &out {
            tracing::debug!(url, bytes = body.len(), "feed fetched");
        }
        out
    }
}

/// Delta-seconds form only; HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_with_defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries(), 4);
        assert_eq!(p.backoff(1), Duration::ZERO);
        assert_eq!(p.backoff(2), Duration::from_millis(1200));
        assert_eq!(p.backoff(3), Duration::from_millis(2400));
        assert_eq!(p.backoff(4), Duration::from_millis(4800));
    }

    #[test]
    fn backoff_is_capped() {
        let p = RetryPolicy::new(30, 0.6).with_backoff_max(Duration::from_secs(5));
        assert_eq!(p.backoff(10), Duration::from_secs(5));
        assert_eq!(p.backoff(u32::MAX), Duration::from_secs(5));
        assert_eq!(
            p.delay_for(2, Some(Duration::from_secs(3600))),
            Duration::from_secs(5)
        );
        assert_eq!(p.delay_for(2, Some(Duration::from_secs(2))), Duration::from_secs(2));
    }

    #[test]
    fn only_transient_statuses_and_idempotent_methods_retry() {
        let p = RetryPolicy::default();
        for s in [429, 500, 502, 503, 504] {
            assert!(p.is_retryable_status(s), "{s}");
        }
        for s in [400, 401, 403, 404, 410, 501] {
            assert!(!p.is_retryable_status(s), "{s}");
        }
        assert!(p.allows_method(&Method::GET));
        assert!(p.allows_method(&Method::HEAD));
        assert!(!p.allows_method(&Method::POST));
    }

    #[test]
    fn negative_backoff_factor_is_clamped() {
        let p = RetryPolicy::new(2, -1.0);
        assert_eq!(p.backoff(2), Duration::ZERO);
    }

    #[test]
    fn retry_after_parses_delta_seconds_only() {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(parse_retry_after(&h), Some(Duration::from_secs(7)));
        h.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&h), None);
    }
}
