//! PostgreSQL-backed store for jobs, leads, and credits.
//!
//! Compiled only with the `postgres` feature. Domain enums are stored
//! as text, option/signal bags as JSONB. The conditional debit is a
//! single guarded UPDATE so concurrent spenders on one user cannot
//! drive the balance negative even across processes.

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult, PipelineError, Result};
use crate::pipeline::export::LeadFilter;
use crate::traits::store::{CreditStore, JobStore, LeadStore};
use crate::types::credits::{CreditBalance, CreditTransaction, TransactionType};
use crate::types::job::{Job, JobId, JobStatus, JobType, UserId};
use crate::types::lead::{Lead, LeadId, LeadStatus};
use crate::types::options::JobOptions;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id UUID PRIMARY KEY,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    total_urls INTEGER NOT NULL,
    processed_urls INTEGER NOT NULL,
    successful_urls INTEGER NOT NULL,
    failed_urls INTEGER NOT NULL,
    leads_found INTEGER NOT NULL,
    credits_estimated BIGINT NOT NULL,
    credits_used BIGINT NOT NULL,
    options JSONB NOT NULL,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_user_created ON jobs (user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS leads (
    id UUID PRIMARY KEY,
    job_id UUID NOT NULL,
    user_id TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    full_name TEXT,
    job_title TEXT,
    company TEXT,
    linkedin_url TEXT,
    twitter_url TEXT,
    facebook_url TEXT,
    score SMALLINT NOT NULL,
    status TEXT NOT NULL,
    notes TEXT,
    signals JSONB NOT NULL,
    source_url TEXT NOT NULL,
    industry TEXT,
    tags JSONB NOT NULL,
    content_hash TEXT,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_leads_job ON leads (job_id, created_at);
CREATE INDEX IF NOT EXISTS idx_leads_user_created ON leads (user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS credit_balances (
    user_id TEXT PRIMARY KEY,
    balance BIGINT NOT NULL,
    total_purchased BIGINT NOT NULL,
    total_used BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS credit_transactions (
    id UUID PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount BIGINT NOT NULL,
    kind TEXT NOT NULL,
    description TEXT NOT NULL,
    job_id UUID,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_credit_transactions_user ON credit_transactions (user_id, created_at DESC);
"#;

/// PostgreSQL store implementing all three persistence seams.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Open a credit account with an initial grant, or top up an
    /// existing one.
    pub async fn open_account(&self, user: &UserId, initial: i64) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credit_balances (user_id, balance, total_purchased, total_used, updated_at)
            VALUES ($1, $2, $2, 0, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET balance = credit_balances.balance + $2,
                total_purchased = credit_balances.total_purchased + $2,
                updated_at = NOW()
            "#,
        )
        .bind(user.as_str())
        .bind(initial)
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn storage_err(e: sqlx::Error) -> PipelineError {
    PipelineError::Storage(Box::new(e))
}

fn ledger_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(Box::new(e))
}

fn job_from_row(row: &PgRow) -> std::result::Result<Job, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let options: serde_json::Value = row.try_get("options")?;

    Ok(Job {
        id: JobId(row.try_get::<Uuid, _>("id")?),
        user: UserId::new(row.try_get::<String, _>("user_id")?),
        kind: parse_job_type(&kind)?,
        status: parse_job_status(&status)?,
        total_urls: row.try_get::<i32, _>("total_urls")? as u32,
        processed_urls: row.try_get::<i32, _>("processed_urls")? as u32,
        successful_urls: row.try_get::<i32, _>("successful_urls")? as u32,
        failed_urls: row.try_get::<i32, _>("failed_urls")? as u32,
        leads_found: row.try_get::<i32, _>("leads_found")? as u32,
        credits_estimated: row.try_get("credits_estimated")?,
        credits_used: row.try_get("credits_used")?,
        options: serde_json::from_value::<JobOptions>(options)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn lead_from_row(row: &PgRow) -> std::result::Result<Lead, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let signals: serde_json::Value = row.try_get("signals")?;
    let tags: serde_json::Value = row.try_get("tags")?;

    Ok(Lead {
        id: LeadId(row.try_get::<Uuid, _>("id")?),
        job_id: JobId(row.try_get::<Uuid, _>("job_id")?),
        user: UserId::new(row.try_get::<String, _>("user_id")?),
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        full_name: row.try_get("full_name")?,
        job_title: row.try_get("job_title")?,
        company: row.try_get("company")?,
        linkedin_url: row.try_get("linkedin_url")?,
        twitter_url: row.try_get("twitter_url")?,
        facebook_url: row.try_get("facebook_url")?,
        score: row.try_get::<i16, _>("score")? as u8,
        status: parse_lead_status(&status)?,
        notes: row.try_get("notes")?,
        signals: serde_json::from_value(signals).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        source_url: row.try_get("source_url")?,
        industry: row.try_get("industry")?,
        tags: serde_json::from_value(tags).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        content_hash: row.try_get("content_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn balance_from_row(row: &PgRow) -> std::result::Result<CreditBalance, sqlx::Error> {
    Ok(CreditBalance {
        user: UserId::new(row.try_get::<String, _>("user_id")?),
        balance: row.try_get("balance")?,
        total_purchased: row.try_get("total_purchased")?,
        total_used: row.try_get("total_used")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> std::result::Result<CreditTransaction, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    Ok(CreditTransaction {
        id: row.try_get("id")?,
        user: UserId::new(row.try_get::<String, _>("user_id")?),
        amount: row.try_get("amount")?,
        kind: match kind.as_str() {
            "usage" => TransactionType::Usage,
            "refund" => TransactionType::Refund,
            other => return Err(decode_err(format!("unknown transaction kind: {other}"))),
        },
        description: row.try_get("description")?,
        job_id: row.try_get::<Option<Uuid>, _>("job_id")?.map(JobId),
        created_at: row.try_get("created_at")?,
    })
}

fn decode_err(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn job_type_str(kind: JobType) -> &'static str {
    match kind {
        JobType::Single => "single",
        JobType::Bulk => "bulk",
        JobType::Sitemap => "sitemap",
    }
}

fn parse_job_type(s: &str) -> std::result::Result<JobType, sqlx::Error> {
    match s {
        "single" => Ok(JobType::Single),
        "bulk" => Ok(JobType::Bulk),
        "sitemap" => Ok(JobType::Sitemap),
        other => Err(decode_err(format!("unknown job type: {other}"))),
    }
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn parse_job_status(s: &str) -> std::result::Result<JobStatus, sqlx::Error> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(decode_err(format!("unknown job status: {other}"))),
    }
}

fn parse_lead_status(s: &str) -> std::result::Result<LeadStatus, sqlx::Error> {
    match s {
        "hot" => Ok(LeadStatus::Hot),
        "warm" => Ok(LeadStatus::Warm),
        "cold" => Ok(LeadStatus::Cold),
        other => Err(decode_err(format!("unknown lead status: {other}"))),
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        let options = serde_json::to_value(&job.options)?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, user_id, kind, status, total_urls, processed_urls,
                              successful_urls, failed_urls, leads_found, credits_estimated,
                              credits_used, options, error_message, created_at, started_at,
                              completed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(job.id.0)
        .bind(job.user.as_str())
        .bind(job_type_str(job.kind))
        .bind(job_status_str(job.status))
        .bind(job.total_urls as i32)
        .bind(job.processed_urls as i32)
        .bind(job.successful_urls as i32)
        .bind(job.failed_urls as i32)
        .bind(job.leads_found as i32)
        .bind(job.credits_estimated)
        .bind(job.credits_used)
        .bind(options)
        .bind(job.error_message.as_deref())
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(job_from_row).transpose().map_err(storage_err)
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let options = serde_json::to_value(&job.options)?;
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                processed_urls = $3,
                successful_urls = $4,
                failed_urls = $5,
                leads_found = $6,
                credits_used = $7,
                options = $8,
                error_message = $9,
                started_at = $10,
                completed_at = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(job.id.0)
        .bind(job_status_str(job.status))
        .bind(job.processed_urls as i32)
        .bind(job.successful_urls as i32)
        .bind(job.failed_urls as i32)
        .bind(job.leads_found as i32)
        .bind(job.credits_used)
        .bind(options)
        .bind(job.error_message.as_deref())
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn jobs_for_user(&self, user: &UserId) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(job_from_row).collect::<std::result::Result<_, _>>().map_err(storage_err)
    }
}

#[async_trait::async_trait]
impl LeadStore for PostgresStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        let signals = serde_json::to_value(&lead.signals)?;
        let tags = serde_json::to_value(&lead.tags)?;
        sqlx::query(
            r#"
            INSERT INTO leads (id, job_id, user_id, email, phone, full_name, job_title,
                               company, linkedin_url, twitter_url, facebook_url, score,
                               status, notes, signals, source_url, industry, tags,
                               content_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20)
            "#,
        )
        .bind(lead.id.0)
        .bind(lead.job_id.0)
        .bind(lead.user.as_str())
        .bind(lead.email.as_deref())
        .bind(lead.phone.as_deref())
        .bind(lead.full_name.as_deref())
        .bind(lead.job_title.as_deref())
        .bind(lead.company.as_deref())
        .bind(lead.linkedin_url.as_deref())
        .bind(lead.twitter_url.as_deref())
        .bind(lead.facebook_url.as_deref())
        .bind(lead.score as i16)
        .bind(lead.status.as_str())
        .bind(lead.notes.as_deref())
        .bind(signals)
        .bind(&lead.source_url)
        .bind(lead.industry.as_deref())
        .bind(tags)
        .bind(lead.content_hash.as_deref())
        .bind(lead.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn leads_for_job(&self, job_id: JobId) -> Result<Vec<Lead>> {
        let rows = sqlx::query("SELECT * FROM leads WHERE job_id = $1 ORDER BY created_at")
            .bind(job_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(lead_from_row).collect::<std::result::Result<_, _>>().map_err(storage_err)
    }

    async fn query_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        // Broad fetch narrowed by indexed columns; the remaining filter
        // fields are applied in memory, matching the store-agnostic
        // filter semantics.
        let rows = match (&filter.user, &filter.job_id) {
            (_, Some(job_id)) => {
                sqlx::query("SELECT * FROM leads WHERE job_id = $1 ORDER BY created_at DESC")
                    .bind(job_id.0)
                    .fetch_all(&self.pool)
                    .await
            }
            (Some(user), None) => {
                sqlx::query("SELECT * FROM leads WHERE user_id = $1 ORDER BY created_at DESC")
                    .bind(user.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            (None, None) => {
                sqlx::query("SELECT * FROM leads ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage_err)?;

        let leads = rows
            .iter()
            .map(lead_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;

        Ok(leads.into_iter().filter(|l| filter.matches(l)).collect())
    }

    async fn count_leads(&self, filter: &LeadFilter) -> Result<usize> {
        Ok(self.query_leads(filter).await?.len())
    }
}

#[async_trait::async_trait]
impl CreditStore for PostgresStore {
    async fn get_balance(&self, user: &UserId) -> LedgerResult<Option<CreditBalance>> {
        let row = sqlx::query("SELECT * FROM credit_balances WHERE user_id = $1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(ledger_err)?;

        row.as_ref().map(balance_from_row).transpose().map_err(ledger_err)
    }

    async fn try_debit(&self, user: &UserId, amount: i64) -> LedgerResult<CreditBalance> {
        let row = sqlx::query(
            r#"
            UPDATE credit_balances
            SET balance = balance - $2,
                total_used = total_used + $2,
                updated_at = NOW()
            WHERE user_id = $1 AND balance >= $2
            RETURNING user_id, balance, total_purchased, total_used, updated_at
            "#,
        )
        .bind(user.as_str())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_err)?;

        match row {
            Some(row) => balance_from_row(&row).map_err(ledger_err),
            // The guard refused: distinguish a missing account from an
            // insufficient balance.
            None => match self.get_balance(user).await? {
                Some(balance) => Err(LedgerError::InsufficientCredits {
                    required: amount,
                    available: balance.balance,
                }),
                None => Err(LedgerError::MissingAccount {
                    user_id: user.as_str().to_string(),
                }),
            },
        }
    }

    async fn credit(&self, user: &UserId, amount: i64) -> LedgerResult<CreditBalance> {
        let row = sqlx::query(
            r#"
            UPDATE credit_balances
            SET balance = balance + $2,
                total_used = total_used - $2,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, balance, total_purchased, total_used, updated_at
            "#,
        )
        .bind(user.as_str())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_err)?;

        match row {
            Some(row) => balance_from_row(&row).map_err(ledger_err),
            None => Err(LedgerError::MissingAccount {
                user_id: user.as_str().to_string(),
            }),
        }
    }

    async fn record_transaction(&self, tx: &CreditTransaction) -> LedgerResult<()> {
        let kind = match tx.kind {
            TransactionType::Usage => "usage",
            TransactionType::Refund => "refund",
        };
        sqlx::query(
            r#"
            INSERT INTO credit_transactions (id, user_id, amount, kind, description, job_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tx.id)
        .bind(tx.user.as_str())
        .bind(tx.amount)
        .bind(kind)
        .bind(&tx.description)
        .bind(tx.job_id.map(|j| j.0))
        .bind(tx.created_at)
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;
        Ok(())
    }

    async fn transactions_for_user(&self, user: &UserId) -> LedgerResult<Vec<CreditTransaction>> {
        let rows = sqlx::query(
            "SELECT * FROM credit_transactions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_err)?;

        rows.iter()
            .map(transaction_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(ledger_err)
    }
}
