//! Storage traits - the relational-store seam.
//!
//! The pipeline issues logical operations (insert job, update counters,
//! insert lead, mutate balances, append transactions) and expects
//! row-level consistency per call, not cross-call transactions.

use async_trait::async_trait;

use crate::error::{LedgerResult, Result};
use crate::pipeline::export::LeadFilter;
use crate::types::credits::{CreditBalance, CreditTransaction};
use crate::types::job::{Job, JobId, UserId};
use crate::types::lead::Lead;

/// Persistence for [`Job`] rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Replace the stored row for `job.id` (counters, status, stamps).
    async fn update_job(&self, job: &Job) -> Result<()>;

    async fn jobs_for_user(&self, user: &UserId) -> Result<Vec<Job>>;
}

/// Persistence for [`Lead`] rows.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert_lead(&self, lead: &Lead) -> Result<()>;

    async fn leads_for_job(&self, job_id: JobId) -> Result<Vec<Lead>>;

    /// Leads matching a filter, most recent first.
    async fn query_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;

    async fn count_leads(&self, filter: &LeadFilter) -> Result<usize>;
}

/// Persistence for credit balances and the append-only transaction log.
///
/// `try_debit` must be atomic at the storage layer: it refuses debits
/// that would drive the balance negative and reports the refusal as
/// [`crate::error::LedgerError::InsufficientCredits`].
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn get_balance(&self, user: &UserId) -> LedgerResult<Option<CreditBalance>>;

    /// Conditionally debit: `balance -= amount`, `total_used += amount`,
    /// only if `balance >= amount`. Returns the updated balance.
    async fn try_debit(&self, user: &UserId, amount: i64) -> LedgerResult<CreditBalance>;

    /// Credit back: `balance += amount`, `total_used -= amount`.
    /// Returns the updated balance.
    async fn credit(&self, user: &UserId, amount: i64) -> LedgerResult<CreditBalance>;

    async fn record_transaction(&self, tx: &CreditTransaction) -> LedgerResult<()>;

    async fn transactions_for_user(&self, user: &UserId) -> LedgerResult<Vec<CreditTransaction>>;
}

/// Blanket alias for a store implementing all three persistence seams.
pub trait PipelineStore: JobStore + LeadStore + CreditStore {}

impl<T: JobStore + LeadStore + CreditStore> PipelineStore for T {}
