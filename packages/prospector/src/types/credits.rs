//! Credit accounting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::job::{JobId, UserId};

/// Running balance for one user.
///
/// Accounting identity: `balance = total_purchased - total_used` at any
/// consistent read. Refunds decrement `total_used`, keeping the
/// identity intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditBalance {
    pub user: UserId,
    pub balance: i64,
    pub total_purchased: i64,
    pub total_used: i64,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    /// Open a new account with an initial grant.
    pub fn new(user: UserId, initial: i64) -> Self {
        Self {
            user,
            balance: initial,
            total_purchased: initial,
            total_used: 0,
            updated_at: Utc::now(),
        }
    }

    /// Whether the accounting identity holds.
    pub fn identity_holds(&self) -> bool {
        self.balance == self.total_purchased - self.total_used
    }
}

/// Direction of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Debit for work performed; amount is negative
    Usage,

    /// Return of reserved-but-unused credits; amount is positive
    Refund,
}

/// One append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user: UserId,

    /// Signed amount: negative for usage, positive for refunds
    pub amount: i64,
    pub kind: TransactionType,
    pub description: String,
    pub job_id: Option<JobId>,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn usage(
        user: UserId,
        amount: i64,
        description: impl Into<String>,
        job_id: Option<JobId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            amount: -amount.abs(),
            kind: TransactionType::Usage,
            description: description.into(),
            job_id,
            created_at: Utc::now(),
        }
    }

    pub fn refund(
        user: UserId,
        amount: i64,
        description: impl Into<String>,
        job_id: Option<JobId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            amount: amount.abs(),
            kind: TransactionType::Refund,
            description: description.into(),
            job_id,
            created_at: Utc::now(),
        }
    }
}

/// Result of a read-only balance check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCheck {
    pub has_enough: bool,
    pub current_balance: i64,
    pub required: i64,
}
