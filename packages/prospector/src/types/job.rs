//! Job types - one scraping run tracked through a status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::types::options::JobOptions;

/// Identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier for the owning user, supplied by the external auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How the job's URL set is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// One URL supplied directly
    Single,

    /// A list of URLs supplied directly or from an uploaded list
    Bulk,

    /// URLs discovered from a sitemap document
    Sitemap,
}

/// Job lifecycle status.
///
/// Transitions are monotonic: `Pending -> Processing -> {Completed |
/// Failed}`, with `Cancelled` reachable from `Pending` or `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether `next` is a legal forward transition from this status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// One scraping run over a set of URLs.
///
/// Counter invariants (enforced by the orchestrator's update paths):
/// `processed_urls <= total_urls` and
/// `successful_urls + failed_urls <= processed_urls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user: UserId,
    pub kind: JobType,
    pub status: JobStatus,

    pub total_urls: u32,
    pub processed_urls: u32,
    pub successful_urls: u32,
    pub failed_urls: u32,
    pub leads_found: u32,

    /// Credits reserved at creation (pessimistic)
    pub credits_estimated: i64,

    /// Credits actually consumed, reconciled at completion
    pub credits_used: i64,

    pub options: JobOptions,

    /// Human-readable failure description for terminal `Failed` jobs
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        user: UserId,
        kind: JobType,
        total_urls: u32,
        credits_estimated: i64,
        options: JobOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user,
            kind,
            status: JobStatus::Pending,
            total_urls,
            processed_urls: 0,
            successful_urls: 0,
            failed_urls: 0,
            leads_found: 0,
            credits_estimated,
            credits_used: 0,
            options,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Move the job to a new status, enforcing the monotonic state machine.
    ///
    /// Stamps `started_at`/`completed_at` as appropriate.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            JobStatus::Processing => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at = Some(now)
            }
            JobStatus::Pending => {}
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record one processed URL that produced no error.
    ///
    /// `leads` is 0 for keyword-mismatch skips, 1 otherwise.
    pub fn record_success(&mut self, leads: u32) {
        debug_assert!(self.processed_urls < self.total_urls);
        self.processed_urls += 1;
        self.successful_urls += 1;
        self.leads_found += leads;
        self.updated_at = Utc::now();
    }

    /// Record one processed URL that failed.
    pub fn record_failure(&mut self) {
        debug_assert!(self.processed_urls < self.total_urls);
        self.processed_urls += 1;
        self.failed_urls += 1;
        self.updated_at = Utc::now();
    }

    /// Whether the counter invariants hold.
    pub fn counters_consistent(&self) -> bool {
        self.processed_urls <= self.total_urls
            && self.successful_urls + self.failed_urls <= self.processed_urls
    }
}

/// Snapshot of a job's progress for polling observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub total_urls: u32,
    pub processed_urls: u32,
    pub successful_urls: u32,
    pub failed_urls: u32,
    pub leads_found: u32,
}

impl From<&Job> for JobProgress {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            total_urls: job.total_urls,
            processed_urls: job.processed_urls,
            successful_urls: job.successful_urls,
            failed_urls: job.failed_urls,
            leads_found: job.leads_found,
        }
    }
}
