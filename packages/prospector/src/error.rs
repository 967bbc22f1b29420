//! Typed errors for the pipeline library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use std::time::Duration;

use thiserror::Error;

use crate::types::job::{JobId, JobStatus};

/// Errors that can occur during pipeline operations.
///
/// Variants here are job-fatal: they either reject a job before it is
/// created or mark it failed. Per-URL failures are captured as
/// [`CrawlError`] values and folded into job counters instead of
/// propagating.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Job specification failed validation
    #[error("invalid job: {reason}")]
    Validation { reason: String },

    /// Sitemap could not be fetched or parsed (fatal at job creation)
    #[error("sitemap resolution failed for {url}: {message}")]
    SitemapResolution { url: String, message: String },

    /// Credit ledger operation failed
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Crawl operation failed
    #[error("crawl failed: {0}")]
    Crawl(#[from] CrawlError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Job not found in store
    #[error("job not found: {id}")]
    JobNotFound { id: JobId },

    /// Attempted a non-monotonic status transition
    #[error("invalid job transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// Request refused by a rate limiter; retryable after the given delay
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that can occur while fetching a single URL.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Security validation failed
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// HTTP request failed
    #[error("HTTP error fetching {url}: {message}")]
    Http { url: String, message: String },

    /// Non-2xx status code
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Connection or read timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Crawl policy disallows this URL
    #[error("robots.txt disallows: {url}")]
    RobotsDisallowed { url: String },
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Errors from the credit ledger.
///
/// These are the only pipeline-internal errors that must always
/// propagate to the caller: silently continuing past a failed debit or
/// refund would corrupt the accounting identity.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No credit account exists for the user
    #[error("no credit account for user: {user_id}")]
    MissingAccount { user_id: String },

    /// Debit would drive the balance negative
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    /// Storage operation failed
    #[error("ledger storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the external qualification provider.
///
/// Qualification is best-effort: the orchestrator maps every variant to
/// "use the heuristic result" rather than failing the URL.
#[derive(Debug, Error)]
pub enum QualifyError {
    /// No provider is configured
    #[error("no qualification provider configured")]
    NotConfigured,

    /// Provider call failed (network, auth, 5xx)
    #[error("provider error: {0}")]
    Provider(String),

    /// Provider responded but no JSON object could be recovered
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for URL security validation.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Result type alias for qualification calls.
pub type QualifyResult<T> = std::result::Result<T, QualifyError>;
