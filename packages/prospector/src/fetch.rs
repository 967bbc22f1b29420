//! Page fetching - HTTP GET with timeout, UA, SSRF validation, and an
//! optional courtesy throttle.

use std::collections::HashSet;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use tracing::{debug, warn};
use url::Url;

use crate::error::{CrawlError, CrawlResult, SecurityError, SecurityResult};
use crate::traits::fetcher::Fetcher;
use crate::types::page::FetchedPage;

/// Default user agent sent on every pipeline request.
pub const DEFAULT_USER_AGENT: &str =
    "ProspectorBot/1.0 (+https://github.com/prospector/prospector)";

/// Default page fetch timeout.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// URL validator for SSRF protection.
///
/// Validates URLs before fetching to prevent:
/// - Access to internal services (localhost, 127.0.0.1)
/// - Access to private IP ranges (10.x, 172.16.x, 192.168.x)
/// - Access to cloud metadata services (169.254.x)
/// - Non-HTTP(S) schemes (file://, ftp://)
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,

    /// Hosts that bypass validation (for tests against local servers)
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "[::1]",
                "0.0.0.0",
                "metadata.google.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            allowed_hosts: HashSet::new(),
        }
    }

    /// Permit a specific host regardless of other rules.
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Validate a URL, returning the parsed form when acceptable.
    pub fn validate(&self, url: &str) -> SecurityResult<Url> {
        let parsed = Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.allowed_hosts.contains(host) {
            return Ok(parsed);
        }

        if self.blocked_hosts.contains(host) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }

        // Literal IPs in private/reserved ranges
        if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
            if Self::ip_is_private(&ip) {
                return Err(SecurityError::BlockedHost(host.to_string()));
            }
        }

        Ok(parsed)
    }

    fn ip_is_private(ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                let [a, b, _, _] = v4.octets();
                v4.is_loopback()
                    || v4.is_private()
                    || v4.is_link_local()
                    || v4.is_unspecified()
                    || (a == 100 && (64..128).contains(&b)) // CGNAT
            }
            IpAddr::V6(v6) => {
                v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
            }
        }
    }
}

/// HTTP page fetcher with timeout and a descriptive user agent.
///
/// Failures are classified into [`CrawlError`] variants: the caller
/// treats each as a per-URL failure, never as job-fatal.
pub struct PageFetcher {
    client: reqwest::Client,
    user_agent: String,
    validator: UrlValidator,
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher {
    pub fn new() -> Self {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    /// Create a fetcher with a specific request timeout. Robots and
    /// sitemap clients apply their own tighter per-call bounds on top.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build HTTP client"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            validator: UrlValidator::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[async_trait]
impl Fetcher for PageFetcher {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.validator.validate(url)?;

        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                if e.is_timeout() {
                    CrawlError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    CrawlError::Http {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let html = response.text().await.map_err(|e| CrawlError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut page = FetchedPage::new(url, html)
            .with_final_url(final_url)
            .with_status(status.as_u16());
        page.fetched_at = Utc::now();
        if let Some(ct) = content_type {
            page = page.with_content_type(ct);
        }

        Ok(page)
    }
}

/// A fetcher wrapper that enforces an outbound request rate.
///
/// Uses the governor crate for precise rate limiting with burst
/// support. This is target-site courtesy; the caller-facing quota in
/// [`crate::limiter`] is a separate concern.
pub struct ThrottledFetcher<F: Fetcher> {
    inner: F,
    limiter: Arc<DirectRateLimiter>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    /// Wrap a fetcher with a sustained requests-per-second cap.
    pub fn new(inner: F, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).expect("requests_per_second must be > 0"),
        );
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wrap with burst support.
    pub fn with_burst(inner: F, requests_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).expect("requests_per_second must be > 0"),
        )
        .allow_burst(NonZeroU32::new(burst).expect("burst must be > 0"));

        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.limiter.until_ready().await;
        self.inner.fetch(url).await
    }
}

/// Extension trait for easy throttling.
pub trait FetcherExt: Fetcher + Sized {
    /// Wrap this fetcher with an outbound rate cap.
    fn throttled(self, requests_per_second: u32) -> ThrottledFetcher<Self> {
        ThrottledFetcher::new(self, requests_per_second)
    }
}

impl<F: Fetcher + Sized> FetcherExt for F {}
