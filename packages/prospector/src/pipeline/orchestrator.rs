//! Job orchestration - the top-level state machine.
//!
//! Walks a job's URL set through robots checking, fetching, extraction,
//! and scoring with bounded parallelism, aggregating counters through a
//! single writer and reconciling credits at completion.
//!
//! Failure taxonomy: sitemap resolution, validation, and ledger errors
//! are job-fatal and surface to the caller; everything that happens to
//! one URL is folded into `failed_urls` and the job continues.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, PipelineError, Result};
use crate::extract::{signal_tags, ContentExtractor, ScrapedData};
use crate::fetch::DEFAULT_USER_AGENT;
use crate::ledger::CreditLedger;
use crate::limiter::{FixedWindowLimiter, RateLimitConfig};
use crate::pipeline::export::{export_leads, ExportFormat, LeadFilter};
use crate::qualify::bounded_excerpt;
use crate::robots::{RobotsChecker, RobotsPolicy, ROBOTS_DISALLOW_REASON};
use crate::sitemap::SitemapResolver;
use crate::traits::fetcher::Fetcher;
use crate::traits::qualifier::{Qualification, Qualifier};
use crate::traits::store::PipelineStore;
use crate::types::job::{Job, JobId, JobProgress, JobStatus, JobType, UserId};
use crate::types::lead::{Lead, ScoreBands};
use crate::types::options::JobOptions;
use crate::types::page::FetchedPage;

/// Cap on the resolved URL set for one job.
const MAX_JOB_URLS: usize = 1_000;

/// Robots-requested crawl delays are honored only up to this bound.
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(10);

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bounded worker-pool size for per-URL processing
    pub concurrency: usize,

    /// Credits charged per URL
    pub cost_per_url: i64,

    /// Extra credits per URL when qualification is requested
    pub qualification_surcharge: i64,

    /// Score-to-status mapping policy
    pub score_bands: ScoreBands,

    /// Honor robots.txt crawl-delay requests (bounded)
    pub honor_crawl_delay: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            cost_per_url: 1,
            qualification_surcharge: 1,
            score_bands: ScoreBands::default(),
            honor_crawl_delay: true,
        }
    }
}

/// A job submission.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub user: UserId,
    pub kind: JobType,
    pub urls: Vec<String>,
    pub sitemap_url: Option<String>,
    pub options: JobOptions,
}

impl JobRequest {
    pub fn single(user: UserId, url: impl Into<String>) -> Self {
        Self {
            user,
            kind: JobType::Single,
            urls: vec![url.into()],
            sitemap_url: None,
            options: JobOptions::default(),
        }
    }

    pub fn bulk(user: UserId, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            user,
            kind: JobType::Bulk,
            urls: urls.into_iter().map(|u| u.into()).collect(),
            sitemap_url: None,
            options: JobOptions::default(),
        }
    }

    pub fn sitemap(user: UserId, sitemap_url: impl Into<String>) -> Self {
        Self {
            user,
            kind: JobType::Sitemap,
            urls: Vec::new(),
            sitemap_url: Some(sitemap_url.into()),
            options: JobOptions::default(),
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }
}

/// An accepted job with its resolved URL set, ready to run.
///
/// Credits are already reserved; the URL list is not persisted on the
/// job row, so the caller hands this back to [`JobOrchestrator::run_job`].
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub job: Job,
    urls: Vec<String>,
}

impl PreparedJob {
    pub fn url_count(&self) -> usize {
        self.urls.len()
    }
}

/// Outcome of processing one URL.
enum UrlOutcome {
    /// Extraction succeeded and produced a lead
    Lead(Box<Lead>),

    /// Processed without error but no lead (keyword mismatch)
    NoLead,

    /// Per-URL failure; the job continues
    Failed { url: String, reason: String },

    /// Not processed: cancellation observed first
    Cancelled,
}

/// The top-level pipeline state machine.
pub struct JobOrchestrator<S: PipelineStore> {
    store: Arc<S>,
    ledger: CreditLedger<S>,
    fetcher: Arc<dyn Fetcher>,
    qualifier: Option<Arc<dyn Qualifier>>,
    robots: RobotsChecker,
    sitemaps: SitemapResolver,
    extractor: ContentExtractor,
    scrape_limiter: FixedWindowLimiter,
    export_limiter: FixedWindowLimiter,
    config: OrchestratorConfig,
}

impl<S: PipelineStore> JobOrchestrator<S> {
    pub fn new(store: Arc<S>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            ledger: CreditLedger::new(store.clone()),
            robots: RobotsChecker::new(fetcher.clone(), DEFAULT_USER_AGENT),
            sitemaps: SitemapResolver::new(fetcher.clone()),
            extractor: ContentExtractor::new(),
            scrape_limiter: FixedWindowLimiter::new(RateLimitConfig::scraping()),
            export_limiter: FixedWindowLimiter::new(RateLimitConfig::export()),
            qualifier: None,
            store,
            fetcher,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: Arc<dyn Qualifier>) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_robots_policy(mut self, policy: RobotsPolicy) -> Self {
        self.robots.set_policy(policy);
        self
    }

    pub fn with_limits(mut self, scraping: RateLimitConfig, export: RateLimitConfig) -> Self {
        self.scrape_limiter = FixedWindowLimiter::new(scraping);
        self.export_limiter = FixedWindowLimiter::new(export);
        self
    }

    /// Access the robots checker (for preloading policies in tests).
    pub fn robots(&self) -> &RobotsChecker {
        &self.robots
    }

    /// Validate a request, resolve its URL set, and reserve credits.
    ///
    /// Insufficient credits, sitemap failure, and validation errors
    /// reject the request before any job row is created.
    pub async fn create_job(&self, request: JobRequest) -> Result<PreparedJob> {
        request.options.validate()?;

        let admission = self.scrape_limiter.check(request.user.as_str());
        if !admission.allowed {
            return Err(PipelineError::RateLimited {
                retry_after: admission.retry_after.unwrap_or_default(),
            });
        }

        let urls = self.resolve_urls(&request).await?;
        let total = urls.len() as u32;

        let estimate = urls.len() as i64 * self.cost_per_url(&request.options);
        let check = self.ledger.check_credits(&request.user, estimate).await?;
        if !check.has_enough {
            return Err(PipelineError::Ledger(LedgerError::InsufficientCredits {
                required: estimate,
                available: check.current_balance,
            }));
        }

        let mut job = Job::new(request.user, request.kind, total, estimate, request.options);
        self.store.insert_job(&job).await?;

        // Pessimistic reservation; a lost race against other spenders
        // fails the job here rather than mid-run.
        if let Err(e) = self
            .ledger
            .deduct_credits(
                &job.user,
                estimate,
                format!("Reservation for job {}", job.id),
                Some(job.id),
            )
            .await
        {
            job.error_message = Some(e.to_string());
            job.transition(JobStatus::Failed)?;
            self.store.update_job(&job).await?;
            return Err(e.into());
        }

        info!(
            job_id = %job.id,
            user = %job.user,
            kind = ?job.kind,
            total_urls = total,
            credits_estimated = estimate,
            "job created"
        );

        Ok(PreparedJob { job, urls })
    }

    /// Run an accepted job to a terminal state.
    ///
    /// URLs are processed with bounded parallelism; counters are
    /// aggregated by this single writer and persisted after every URL
    /// so polling observers see live progress. When `cancel` fires,
    /// in-flight URLs finish but no new ones start.
    pub async fn run_job(&self, prepared: PreparedJob, cancel: CancellationToken) -> Result<Job> {
        let PreparedJob { mut job, urls } = prepared;

        job.transition(JobStatus::Processing)?;
        self.store.update_job(&job).await?;

        let cancelled = match self.drive(&mut job, urls, cancel).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                self.abandon_job(&mut job, &e).await;
                return Err(e);
            }
        };

        job.credits_used = job.successful_urls as i64 * self.cost_per_url(&job.options);
        let refund = job.credits_estimated - job.credits_used;

        let terminal = if cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        job.transition(terminal)?;
        if let Err(e) = self.store.update_job(&job).await {
            self.abandon_job(&mut job, &e).await;
            return Err(e);
        }

        info!(
            job_id = %job.id,
            status = ?job.status,
            processed = job.processed_urls,
            successful = job.successful_urls,
            failed = job.failed_urls,
            leads = job.leads_found,
            credits_used = job.credits_used,
            "job finished"
        );

        if refund > 0 {
            if let Err(e) = self
                .ledger
                .refund_credits(
                    &job.user,
                    refund,
                    format!("Reconciliation for job {}", job.id),
                    Some(job.id),
                )
                .await
            {
                // Financial integrity: a failed refund must not vanish.
                job.error_message = Some(format!("credit reconciliation failed: {}", e));
                self.store.update_job(&job).await?;
                return Err(e.into());
            }
        }

        Ok(job)
    }

    /// Process the URL set with bounded parallelism, folding outcomes
    /// into the job's counters. Returns whether cancellation was
    /// observed. A storage error aborts the run; the caller recovers.
    async fn drive(
        &self,
        job: &mut Job,
        urls: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<bool> {
        let job_id = job.id;
        let user = job.user.clone();
        let options = job.options.clone();

        let steps = urls.into_iter().map(|url| {
            let cancel = cancel.clone();
            let options = options.clone();
            let user = user.clone();
            async move {
                if cancel.is_cancelled() {
                    return UrlOutcome::Cancelled;
                }
                self.process_url(&url, job_id, &user, &options).await
            }
        });

        let mut results = futures::stream::iter(steps).buffer_unordered(self.config.concurrency);

        let mut cancelled = false;
        while let Some(outcome) = results.next().await {
            match outcome {
                UrlOutcome::Lead(lead) => {
                    self.store.insert_lead(&lead).await?;
                    job.record_success(1);
                }
                UrlOutcome::NoLead => {
                    job.record_success(0);
                }
                UrlOutcome::Failed { url, reason } => {
                    warn!(job_id = %job_id, url = %url, reason = %reason, "URL failed");
                    job.record_failure();
                }
                UrlOutcome::Cancelled => {
                    cancelled = true;
                }
            }
            self.store.update_job(job).await?;
        }

        Ok(cancelled)
    }

    /// Best-effort cleanup when a storage error interrupts a running
    /// job: mark it failed and return the unconsumed reservation. The
    /// original error still propagates; cleanup failures are logged,
    /// not surfaced.
    async fn abandon_job(&self, job: &mut Job, cause: &PipelineError) {
        job.credits_used = job.successful_urls as i64 * self.cost_per_url(&job.options);
        job.error_message = Some(cause.to_string());

        if job.transition(JobStatus::Failed).is_ok() {
            if let Err(e) = self.store.update_job(job).await {
                warn!(job_id = %job.id, error = %e, "could not persist failed status");
            }
        }

        let refund = job.credits_estimated - job.credits_used;
        if refund > 0 {
            if let Err(e) = self
                .ledger
                .refund_credits(
                    &job.user,
                    refund,
                    format!("Reconciliation for job {}", job.id),
                    Some(job.id),
                )
                .await
            {
                warn!(job_id = %job.id, refund, error = %e, "refund failed for abandoned job");
            }
        }
    }

    /// Create and immediately run a job.
    pub async fn submit(&self, request: JobRequest, cancel: CancellationToken) -> Result<Job> {
        let prepared = self.create_job(request).await?;
        self.run_job(prepared, cancel).await
    }

    /// Progress snapshot for polling observers.
    pub async fn job_progress(&self, id: JobId) -> Result<JobProgress> {
        let job = self
            .store
            .get_job(id)
            .await?
            .ok_or(PipelineError::JobNotFound { id })?;
        Ok(JobProgress::from(&job))
    }

    /// Export leads matching a filter, subject to the export quota.
    pub async fn export(
        &self,
        user: &UserId,
        filter: &LeadFilter,
        format: ExportFormat,
    ) -> Result<Vec<u8>> {
        let admission = self.export_limiter.check(user.as_str());
        if !admission.allowed {
            return Err(PipelineError::RateLimited {
                retry_after: admission.retry_after.unwrap_or_default(),
            });
        }
        export_leads(self.store.as_ref(), filter, format).await
    }

    fn cost_per_url(&self, options: &JobOptions) -> i64 {
        self.config.cost_per_url
            + if options.qualify_leads {
                self.config.qualification_surcharge
            } else {
                0
            }
    }

    /// Resolve the request's final URL set, deduplicated in first-seen
    /// order. Sitemap failure here is fatal: no job row, no debit.
    async fn resolve_urls(&self, request: &JobRequest) -> Result<Vec<String>> {
        let raw = match request.kind {
            JobType::Single | JobType::Bulk => {
                if request.kind == JobType::Single && request.urls.len() != 1 {
                    return Err(PipelineError::Validation {
                        reason: "single jobs take exactly one URL".to_string(),
                    });
                }
                request.urls.clone()
            }
            JobType::Sitemap => {
                let sitemap_url =
                    request
                        .sitemap_url
                        .as_deref()
                        .ok_or_else(|| PipelineError::Validation {
                            reason: "sitemap jobs require a sitemap URL".to_string(),
                        })?;
                self.sitemaps.resolve(sitemap_url).await?
            }
        };

        let mut seen = std::collections::HashSet::new();
        let urls: Vec<String> = raw
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect();

        if urls.is_empty() {
            return Err(PipelineError::Validation {
                reason: "no URLs to process".to_string(),
            });
        }
        if urls.len() > MAX_JOB_URLS {
            return Err(PipelineError::Validation {
                reason: format!("{} URLs exceeds limit {}", urls.len(), MAX_JOB_URLS),
            });
        }

        Ok(urls)
    }

    /// One URL through the pipeline: robots -> fetch -> extract ->
    /// score -> lead. Every failure is contained here.
    async fn process_url(
        &self,
        url: &str,
        job_id: JobId,
        user: &UserId,
        options: &JobOptions,
    ) -> UrlOutcome {
        let decision = self.robots.check(url).await;
        if !decision.allowed {
            return UrlOutcome::Failed {
                url: url.to_string(),
                reason: decision
                    .reason
                    .unwrap_or_else(|| ROBOTS_DISALLOW_REASON.to_string()),
            };
        }

        if self.config.honor_crawl_delay {
            if let Some(delay) = decision.crawl_delay {
                tokio::time::sleep(delay.min(MAX_CRAWL_DELAY)).await;
            }
        }

        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                return UrlOutcome::Failed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let data = match self.extractor.extract(&page.html, url, options) {
            Some(data) => data,
            None => {
                debug!(url = %url, "keyword mismatch, no lead");
                return UrlOutcome::NoLead;
            }
        };

        let lead = self.build_lead(url, job_id, user, options, &page, data).await;
        UrlOutcome::Lead(Box::new(lead))
    }

    /// Assemble a lead from extraction output, attempting provider
    /// qualification when requested. Qualification failure never fails
    /// the URL: the heuristic result stands.
    async fn build_lead(
        &self,
        url: &str,
        job_id: JobId,
        user: &UserId,
        options: &JobOptions,
        page: &FetchedPage,
        data: ScrapedData,
    ) -> Lead {
        let qualification = if options.qualify_leads {
            match &self.qualifier {
                Some(qualifier) => {
                    match qualifier
                        .qualify(bounded_excerpt(&data.clean_text), url)
                        .await
                    {
                        Ok(q) => Some(q),
                        Err(e) => {
                            warn!(
                                url = %url,
                                provider = qualifier.name(),
                                error = %e,
                                "qualification failed, using heuristic score"
                            );
                            None
                        }
                    }
                }
                None => {
                    debug!(url = %url, "no qualifier configured, using heuristic score");
                    None
                }
            }
        } else {
            None
        };

        let mut lead = Lead::new(job_id, user.clone(), url);
        lead.email = data.emails.first().cloned();
        lead.phone = data.phones.first().cloned();
        lead.company = data.company_name.clone();
        lead.linkedin_url = data.linkedin_url.clone();
        lead.twitter_url = data.twitter_url.clone();
        lead.facebook_url = data.facebook_url.clone();
        lead.content_hash = Some(page.content_hash.clone());

        match qualification {
            Some(Qualification {
                score,
                signals,
                notes,
                industry,
                summary,
            }) => {
                // Full override, not a blend
                lead = lead.with_score(score as u16, &self.config.score_bands);
                lead.signals = signals;
                lead.notes = match (notes, summary) {
                    (Some(notes), Some(summary)) => Some(format!("{}\n{}", notes, summary)),
                    (notes, summary) => notes.or(summary),
                };
                if let Some(industry) = industry {
                    lead.tags.push(industry.clone());
                    lead.industry = Some(industry);
                }
            }
            None => {
                lead = lead.with_score(data.heuristic_score as u16, &self.config.score_bands);
                lead.signals = signal_tags(&data.signals);
            }
        }

        lead
    }
}
