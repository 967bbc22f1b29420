//! In-memory storage implementation for testing and development.
//!
//! Not suitable for production: data is lost on restart and invisible
//! to other processes.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{LedgerError, LedgerResult, Result};
use crate::pipeline::export::LeadFilter;
use crate::traits::store::{CreditStore, JobStore, LeadStore};
use crate::types::credits::{CreditBalance, CreditTransaction};
use crate::types::job::{Job, JobId, UserId};
use crate::types::lead::{Lead, LeadId};

/// In-memory store for jobs, leads, and credit accounting.
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    leads: RwLock<HashMap<LeadId, Lead>>,
    balances: RwLock<HashMap<UserId, CreditBalance>>,
    transactions: RwLock<Vec<CreditTransaction>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            leads: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            transactions: RwLock::new(Vec::new()),
        }
    }

    /// Open a credit account with an initial grant.
    ///
    /// Account creation is an onboarding concern outside the pipeline;
    /// this stands in for it in tests and development.
    pub fn open_account(&self, user: UserId, initial: i64) {
        self.balances
            .write()
            .unwrap()
            .insert(user.clone(), CreditBalance::new(user, initial));
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.jobs.write().unwrap().clear();
        self.leads.write().unwrap().clear();
        self.balances.write().unwrap().clear();
        self.transactions.write().unwrap().clear();
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    pub fn lead_count(&self) -> usize {
        self.leads.read().unwrap().len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().unwrap().get(&id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn jobs_for_user(&self, user: &UserId) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| &j.user == user)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| std::cmp::Reverse(j.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        self.leads.write().unwrap().insert(lead.id, lead.clone());
        Ok(())
    }

    async fn leads_for_job(&self, job_id: JobId) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .read()
            .unwrap()
            .values()
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.created_at);
        Ok(leads)
    }

    async fn query_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .read()
            .unwrap()
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        leads.sort_by_key(|l| std::cmp::Reverse(l.created_at));
        Ok(leads)
    }

    async fn count_leads(&self, filter: &LeadFilter) -> Result<usize> {
        Ok(self
            .leads
            .read()
            .unwrap()
            .values()
            .filter(|l| filter.matches(l))
            .count())
    }
}

#[async_trait]
impl CreditStore for MemoryStore {
    async fn get_balance(&self, user: &UserId) -> LedgerResult<Option<CreditBalance>> {
        Ok(self.balances.read().unwrap().get(user).cloned())
    }

    async fn try_debit(&self, user: &UserId, amount: i64) -> LedgerResult<CreditBalance> {
        let mut balances = self.balances.write().unwrap();
        let balance = balances
            .get_mut(user)
            .ok_or_else(|| LedgerError::MissingAccount {
                user_id: user.to_string(),
            })?;

        if balance.balance < amount {
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available: balance.balance,
            });
        }

        balance.balance -= amount;
        balance.total_used += amount;
        balance.updated_at = Utc::now();
        Ok(balance.clone())
    }

    async fn credit(&self, user: &UserId, amount: i64) -> LedgerResult<CreditBalance> {
        let mut balances = self.balances.write().unwrap();
        let balance = balances
            .get_mut(user)
            .ok_or_else(|| LedgerError::MissingAccount {
                user_id: user.to_string(),
            })?;

        balance.balance += amount;
        balance.total_used -= amount;
        balance.updated_at = Utc::now();
        Ok(balance.clone())
    }

    async fn record_transaction(&self, tx: &CreditTransaction) -> LedgerResult<()> {
        self.transactions.write().unwrap().push(tx.clone());
        Ok(())
    }

    async fn transactions_for_user(&self, user: &UserId) -> LedgerResult<Vec<CreditTransaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .iter()
            .filter(|t| &t.user == user)
            .cloned()
            .collect())
    }
}
