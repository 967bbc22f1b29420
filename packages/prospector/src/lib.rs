//! Lead-Generation Scraping and Qualification Pipeline
//!
//! Turns sets of URLs into scored, exportable lead records. A job
//! carries its URL set through robots checking, throttled fetching,
//! regex-based content extraction, heuristic scoring, and optional
//! provider-based qualification, with per-user credit accounting and
//! rate limiting around the whole run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use prospector::{JobOptions, JobOrchestrator, JobRequest, MemoryStore, PageFetcher, UserId};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.open_account(UserId::from("user-1"), 100);
//!
//! let fetcher = Arc::new(PageFetcher::new());
//! let orchestrator = JobOrchestrator::new(store, fetcher);
//!
//! let request = JobRequest::single(UserId::from("user-1"), "https://acme.example")
//!     .with_options(JobOptions::default().with_keywords(["saas"]));
//! let job = orchestrator.submit(request, CancellationToken::new()).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Fetcher, Qualifier, stores)
//! - [`types`] - Jobs, leads, credits, options, fetched pages
//! - [`pipeline`] - Job orchestration and lead export
//! - [`robots`] - Robots.txt parsing and crawl-policy checks
//! - [`fetch`] - HTTP fetching with SSRF validation and throttling
//! - [`sitemap`] - Sitemap URL discovery
//! - [`extract`] - Contact/company extraction and heuristic scoring
//! - [`qualify`] - Provider-based qualification
//! - [`ledger`] - Credit accounting
//! - [`limiter`] - Per-identity fixed-window rate limiting
//! - [`stores`] - Storage implementations (MemoryStore, etc.)
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod limiter;
pub mod pipeline;
pub mod qualify;
pub mod robots;
pub mod sitemap;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{CrawlError, LedgerError, PipelineError, QualifyError, SecurityError};
pub use extract::{ContentExtractor, ScrapedData, Signal};
pub use fetch::{FetcherExt, PageFetcher, ThrottledFetcher, UrlValidator, DEFAULT_USER_AGENT};
pub use ledger::CreditLedger;
pub use limiter::{FixedWindowLimiter, RateLimitConfig, RateLimitDecision};
pub use pipeline::{
    export_leads, ExportFormat, JobOrchestrator, JobRequest, LeadFilter, OrchestratorConfig,
    PreparedJob,
};
pub use qualify::OpenAiQualifier;
pub use robots::{RobotsChecker, RobotsDecision, RobotsPolicy, RobotsTxt};
pub use sitemap::SitemapResolver;
pub use stores::MemoryStore;
pub use traits::{
    fetcher::Fetcher,
    qualifier::{Qualification, Qualifier},
    store::{CreditStore, JobStore, LeadStore, PipelineStore},
};
pub use types::{
    credits::{CreditBalance, CreditCheck, CreditTransaction, TransactionType},
    job::{Job, JobId, JobProgress, JobStatus, JobType, UserId},
    lead::{Lead, LeadId, LeadStatus, ScoreBands},
    options::JobOptions,
    page::FetchedPage,
};
