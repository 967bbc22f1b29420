//! Credit ledger - checks, debits, and refunds per-user balances.
//!
//! Same-user mutations are serialized through a keyed async mutex, and
//! the store's conditional debit refuses to drive a balance negative,
//! so the accounting identity (`balance = purchased - used`) survives
//! concurrent job creation and completion for one user.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::LedgerResult;
use crate::traits::store::CreditStore;
use crate::types::credits::{CreditCheck, CreditTransaction};
use crate::types::job::{JobId, UserId};

/// Credit accounting over a [`CreditStore`].
pub struct CreditLedger<S: CreditStore> {
    store: Arc<S>,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl<S: CreditStore> CreditLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Read-only comparison of balance against a required amount.
    ///
    /// A missing account reads as balance 0 rather than an error;
    /// repeated calls without an intervening debit return the same
    /// balance.
    pub async fn check_credits(&self, user: &UserId, required: i64) -> LedgerResult<CreditCheck> {
        let balance = self
            .store
            .get_balance(user)
            .await?
            .map(|b| b.balance)
            .unwrap_or(0);

        Ok(CreditCheck {
            has_enough: balance >= required,
            current_balance: balance,
            required,
        })
    }

    /// Debit `amount` and append a usage transaction.
    ///
    /// Fails with `MissingAccount` when no ledger record exists and
    /// `InsufficientCredits` when the debit would go negative; both
    /// must propagate to the caller.
    pub async fn deduct_credits(
        &self,
        user: &UserId,
        amount: i64,
        description: impl Into<String>,
        job_id: Option<JobId>,
    ) -> LedgerResult<i64> {
        let guard = self.user_lock(user).await;
        let _held = guard.lock().await;

        let updated = self.store.try_debit(user, amount).await?;
        self.store
            .record_transaction(&CreditTransaction::usage(
                user.clone(),
                amount,
                description,
                job_id,
            ))
            .await?;

        info!(user = %user, amount, balance = updated.balance, "credits debited");
        Ok(updated.balance)
    }

    /// Refund `amount` and append a refund transaction.
    pub async fn refund_credits(
        &self,
        user: &UserId,
        amount: i64,
        description: impl Into<String>,
        job_id: Option<JobId>,
    ) -> LedgerResult<i64> {
        let guard = self.user_lock(user).await;
        let _held = guard.lock().await;

        let updated = self.store.credit(user, amount).await?;
        self.store
            .record_transaction(&CreditTransaction::refund(
                user.clone(),
                amount,
                description,
                job_id,
            ))
            .await?;

        info!(user = %user, amount, balance = updated.balance, "credits refunded");
        Ok(updated.balance)
    }

    async fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::stores::memory::MemoryStore;
    use crate::types::credits::TransactionType;

    fn ledger_with_balance(user: &UserId, amount: i64) -> CreditLedger<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.open_account(user.clone(), amount);
        CreditLedger::new(store)
    }

    #[tokio::test]
    async fn test_check_is_idempotent() {
        let user = UserId::from("u1");
        let ledger = ledger_with_balance(&user, 50);

        let first = ledger.check_credits(&user, 10).await.unwrap();
        let second = ledger.check_credits(&user, 10).await.unwrap();

        assert!(first.has_enough);
        assert_eq!(first.current_balance, 50);
        assert_eq!(second.current_balance, 50);
    }

    #[tokio::test]
    async fn test_missing_account_reads_as_zero() {
        let store = Arc::new(MemoryStore::new());
        let ledger = CreditLedger::new(store);

        let check = ledger
            .check_credits(&UserId::from("nobody"), 1)
            .await
            .unwrap();
        assert!(!check.has_enough);
        assert_eq!(check.current_balance, 0);
    }

    #[tokio::test]
    async fn test_debit_then_refund_restores_balance() {
        let user = UserId::from("u1");
        let ledger = ledger_with_balance(&user, 100);

        let after_debit = ledger
            .deduct_credits(&user, 30, "job reservation", None)
            .await
            .unwrap();
        assert_eq!(after_debit, 70);

        let after_refund = ledger
            .refund_credits(&user, 30, "job reconciliation", None)
            .await
            .unwrap();
        assert_eq!(after_refund, 100);
    }

    #[tokio::test]
    async fn test_debit_on_missing_account_propagates() {
        let store = Arc::new(MemoryStore::new());
        let ledger = CreditLedger::new(store);

        let err = ledger
            .deduct_credits(&UserId::from("nobody"), 5, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingAccount { .. }));
    }

    #[tokio::test]
    async fn test_overdraft_is_refused() {
        let user = UserId::from("u1");
        let ledger = ledger_with_balance(&user, 5);

        let err = ledger
            .deduct_credits(&user, 10, "too much", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                required: 10,
                available: 5
            }
        ));

        // Balance untouched, no transaction appended
        let check = ledger.check_credits(&user, 0).await.unwrap();
        assert_eq!(check.current_balance, 5);
    }

    #[tokio::test]
    async fn test_concurrent_debits_preserve_identity() {
        let user = UserId::from("u1");
        let store = Arc::new(MemoryStore::new());
        store.open_account(user.clone(), 100);
        let ledger = Arc::new(CreditLedger::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                ledger.deduct_credits(&user, 10, "concurrent", None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let balance = store.get_balance(&user).await.unwrap().unwrap();
        assert_eq!(balance.balance, 0);
        assert_eq!(balance.total_used, 100);
        assert!(balance.identity_holds());

        let txs = store.transactions_for_user(&user).await.unwrap();
        assert_eq!(txs.len(), 10);
        assert!(txs.iter().all(|t| t.kind == TransactionType::Usage));
    }
}
