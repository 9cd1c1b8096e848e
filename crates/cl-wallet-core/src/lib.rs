use anyhow::Result;
use chrono::NaiveDate;
use cl_api_types::{EventId, Metadata, TransactionKind, TransactionRecord, UserId, WithdrawalStatus};
use cl_ledger::{CreditOutcome, DebitOutcome, LedgerError, WalletBalances};
use cl_storage::{BookmarkState, LedgerStore};
use cl_withdrawals::{WithdrawalRequest, WithdrawalSchedule};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Orchestrates ledger operations over a [`LedgerStore`]. Validation and
/// policy live here; atomicity lives in the store.
pub struct LedgerCore<S: LedgerStore + ?Sized> {
    store: Arc<S>,
}

impl<S: LedgerStore + ?Sized> Clone for LedgerCore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore + ?Sized> LedgerCore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn balances(&self, user: &UserId) -> Result<WalletBalances> {
        self.store.wallet_balances(user).await
    }

    /// Spend coins for a labeled reason. Exactly one attempt: the debit
    /// path is never retried and has no fallback write.
    pub async fn debit(
        &self,
        user: &UserId,
        amount: u64,
        reason: &str,
        metadata: Metadata,
    ) -> Result<DebitOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let outcome = self
            .store
            .debit(user, amount, TransactionKind::Debit, reason, metadata)
            .await?;

        info!(
            user = %user.0,
            amount,
            free_used = outcome.allocation.free_used,
            paid_used = outcome.allocation.paid_used,
            "debit applied"
        );
        Ok(outcome)
    }

    /// Claw back previously granted coins. Same spend path as a debit,
    /// journaled as `credit_reversal`.
    pub async fn reverse_credit(
        &self,
        user: &UserId,
        amount: u64,
        reason: &str,
        metadata: Metadata,
    ) -> Result<DebitOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.store
            .debit(user, amount, TransactionKind::CreditReversal, reason, metadata)
            .await
    }

    pub async fn credit(
        &self,
        user: &UserId,
        amount: u64,
        kind: TransactionKind,
        description: &str,
        metadata: Metadata,
    ) -> Result<CreditOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if !kind.is_credit() {
            return Err(LedgerError::InvalidKind {
                kind: kind.as_str(),
            });
        }
        self.store
            .credit(user, amount, kind, description, metadata)
            .await
    }

    pub async fn transactions(
        &self,
        user: &UserId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<TransactionRecord>> {
        self.store.transactions(user, limit, kind).await
    }

    pub async fn toggle_bookmark(&self, user: &UserId, event: &EventId) -> Result<BookmarkState> {
        self.store.toggle_bookmark(user, event).await
    }

    pub async fn withdrawal_schedule(&self) -> Result<Option<WithdrawalSchedule>> {
        self.store.withdrawal_schedule().await
    }

    pub async fn save_withdrawal_schedule(&self, schedule: &WithdrawalSchedule) -> Result<()> {
        self.store.save_withdrawal_schedule(schedule).await
    }

    /// Organizer payout submission. Refused when no schedule is configured
    /// or today is not an allowed day; the error carries the next open
    /// date so callers can surface it.
    pub async fn submit_withdrawal(
        &self,
        organizer: &UserId,
        amount_gross: u64,
        today: NaiveDate,
    ) -> Result<WithdrawalRequest, LedgerError> {
        if amount_gross == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let schedule = self
            .store
            .withdrawal_schedule()
            .await?
            .ok_or(LedgerError::WithdrawalsClosed { next_open: None })?;

        if !schedule.is_open(today) {
            return Err(LedgerError::WithdrawalsClosed {
                next_open: Some(schedule.next_open_date(today)),
            });
        }

        let request = WithdrawalRequest::new(organizer.clone(), amount_gross, chrono::Utc::now());
        self.store.create_withdrawal(&request).await?;
        info!(
            organizer = %organizer.0,
            gross = request.amount_gross,
            net = request.amount_net,
            "withdrawal request created"
        );
        Ok(request)
    }

    pub async fn withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>> {
        self.store.withdrawal(id).await
    }

    pub async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        self.store.list_withdrawals(status, limit).await
    }

    pub async fn decide_withdrawal(
        &self,
        id: Uuid,
        next: WithdrawalStatus,
    ) -> Result<WithdrawalRequest, LedgerError> {
        self.store.set_withdrawal_status(id, next).await
    }
}
