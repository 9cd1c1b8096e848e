use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use cl_api_types::{EventId, Metadata, TransactionKind, TransactionRecord, UserId, WithdrawalStatus};
use cl_ledger::{CreditOutcome, DebitOutcome, LedgerError, WalletBalances, allocate_debit};
use cl_withdrawals::{WithdrawalRequest, WithdrawalSchedule};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{BookmarkState, LedgerStore};

#[derive(Default)]
struct State {
    wallets: HashMap<UserId, WalletBalances>,
    journal: Vec<TransactionRecord>,
    bookmarks: HashSet<(UserId, EventId)>,
    rates: Vec<u64>,
    schedule: Option<WithdrawalSchedule>,
    withdrawals: Vec<WithdrawalRequest>,
}

/// Reference store for dev mode and tests. One lock guards all state, so
/// every mutation gets the same check-and-write atomicity the Postgres
/// repository gets from a transaction.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: RwLock<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/dev convenience: set a wallet's balances directly, without a
    /// journal entry.
    pub async fn seed_wallet(&self, user: &UserId, paid: u64, free: u64) {
        let mut state = self.inner.write().await;
        state
            .wallets
            .insert(user.clone(), WalletBalances::new(paid, free));
    }

    pub async fn push_rate(&self, fcfa_per_coin: u64) {
        let mut state = self.inner.write().await;
        state.rates.push(fcfa_per_coin);
    }

    fn bookmark_count_locked(state: &State, event: &EventId) -> u64 {
        state
            .bookmarks
            .iter()
            .filter(|(_, bookmarked)| bookmarked == event)
            .count() as u64
    }
}

fn journal_entry(
    user: &UserId,
    amount: i64,
    kind: TransactionKind,
    description: &str,
    metadata: Metadata,
) -> TransactionRecord {
    TransactionRecord {
        id: Uuid::new_v4(),
        user_id: user.clone(),
        amount,
        kind,
        description: description.to_owned(),
        metadata,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn wallet_balances(&self, user: &UserId) -> Result<WalletBalances> {
        let state = self.inner.read().await;
        Ok(state.wallets.get(user).copied().unwrap_or_default())
    }

    async fn debit(
        &self,
        user: &UserId,
        amount: u64,
        kind: TransactionKind,
        description: &str,
        mut metadata: Metadata,
    ) -> Result<DebitOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if kind.is_credit() {
            return Err(LedgerError::InvalidKind {
                kind: kind.as_str(),
            });
        }

        let mut state = self.inner.write().await;
        let balances = state.wallets.get(user).copied().unwrap_or_default();

        let Some(allocation) = allocate_debit(balances, amount) else {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: balances.total(),
            });
        };

        let after = balances.after_debit(allocation);
        state.wallets.insert(user.clone(), after);

        metadata.insert("free_used".to_owned(), allocation.free_used.into());
        metadata.insert("paid_used".to_owned(), allocation.paid_used.into());
        let entry = journal_entry(user, -(amount as i64), kind, description, metadata);
        let transaction_id = entry.id;
        state.journal.push(entry);

        Ok(DebitOutcome {
            transaction_id,
            allocation,
            balances_after: after,
        })
    }

    async fn credit(
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

        let mut state = self.inner.write().await;
        let mut balances = state.wallets.get(user).copied().unwrap_or_default();
        match kind {
            TransactionKind::Purchase => balances.paid = balances.paid.saturating_add(amount),
            _ => balances.free = balances.free.saturating_add(amount),
        }
        state.wallets.insert(user.clone(), balances);

        let entry = journal_entry(user, amount as i64, kind, description, metadata);
        let transaction_id = entry.id;
        state.journal.push(entry);

        Ok(CreditOutcome {
            transaction_id,
            balances_after: balances,
        })
    }

    async fn transactions(
        &self,
        user: &UserId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<TransactionRecord>> {
        let state = self.inner.read().await;
        let mut records: Vec<TransactionRecord> = state
            .journal
            .iter()
            .filter(|record| &record.user_id == user)
            .filter(|record| kind.is_none_or(|kind| record.kind == kind))
            .cloned()
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn latest_rate(&self) -> Result<Option<u64>> {
        let state = self.inner.read().await;
        Ok(state.rates.last().copied())
    }

    async fn toggle_bookmark(&self, user: &UserId, event: &EventId) -> Result<BookmarkState> {
        let mut state = self.inner.write().await;
        let key = (user.clone(), event.clone());

        let is_bookmarked = if state.bookmarks.remove(&key) {
            false
        } else {
            state.bookmarks.insert(key);
            true
        };

        Ok(BookmarkState {
            is_bookmarked,
            count: Self::bookmark_count_locked(&state, event),
        })
    }

    async fn bookmark_count(&self, event: &EventId) -> Result<u64> {
        let state = self.inner.read().await;
        Ok(Self::bookmark_count_locked(&state, event))
    }

    async fn withdrawal_schedule(&self) -> Result<Option<WithdrawalSchedule>> {
        let state = self.inner.read().await;
        Ok(state.schedule.clone())
    }

    async fn save_withdrawal_schedule(&self, schedule: &WithdrawalSchedule) -> Result<()> {
        let mut state = self.inner.write().await;
        state.schedule = Some(schedule.clone());
        Ok(())
    }

    async fn create_withdrawal(&self, request: &WithdrawalRequest) -> Result<()> {
        let mut state = self.inner.write().await;
        state.withdrawals.push(request.clone());
        Ok(())
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>> {
        let state = self.inner.read().await;
        Ok(state
            .withdrawals
            .iter()
            .find(|request| request.id == id)
            .cloned())
    }

    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        let state = self.inner.read().await;
        let mut requests: Vec<WithdrawalRequest> = state
            .withdrawals
            .iter()
            .filter(|request| status.is_none_or(|status| request.status == status))
            .cloned()
            .collect();

        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        requests.truncate(limit);
        Ok(requests)
    }

    async fn set_withdrawal_status(
        &self,
        id: Uuid,
        next: WithdrawalStatus,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut state = self.inner.write().await;
        let request = state
            .withdrawals
            .iter_mut()
            .find(|request| request.id == id)
            .ok_or(LedgerError::WithdrawalNotFound(id))?;

        if !request.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                from: request.status,
                to: next,
            });
        }

        request.status = next;
        Ok(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(id: &str) -> UserId {
        UserId(id.to_owned())
    }

    fn event(id: &str) -> EventId {
        EventId(id.to_owned())
    }

    #[tokio::test]
    async fn debit_splits_free_first_and_journals() -> Result<()> {
        let store = InMemoryLedger::new();
        let alice = user("alice");
        store.seed_wallet(&alice, 100, 20).await;

        let outcome = store
            .debit(&alice, 30, TransactionKind::Debit, "raffle entry", Metadata::new())
            .await?;

        assert_eq!(outcome.allocation.free_used, 20);
        assert_eq!(outcome.allocation.paid_used, 10);
        assert_eq!(outcome.balances_after, WalletBalances::new(90, 0));
        assert_eq!(store.wallet_balances(&alice).await?, WalletBalances::new(90, 0));

        let records = store.transactions(&alice, 10, None).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, -30);
        assert_eq!(records[0].kind, TransactionKind::Debit);
        assert_eq!(records[0].metadata["free_used"], 20);
        assert_eq!(records[0].metadata["paid_used"], 10);
        Ok(())
    }

    #[tokio::test]
    async fn debit_on_empty_wallet_fails_without_mutation() -> Result<()> {
        let store = InMemoryLedger::new();
        let bob = user("bob");

        let err = store
            .debit(&bob, 1, TransactionKind::Debit, "vote", Metadata::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                requested: 1,
                available: 0
            }
        ));
        assert_eq!(store.wallet_balances(&bob).await?, WalletBalances::default());
        assert!(store.transactions(&bob, 10, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() -> Result<()> {
        let store = Arc::new(InMemoryLedger::new());
        let carol = user("carol");
        store.seed_wallet(&carol, 50, 50).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            let carol = carol.clone();
            handles.push(tokio::spawn(async move {
                store
                    .debit(&carol, 10, TransactionKind::Debit, "spend", Metadata::new())
                    .await
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        // 100 coins cover exactly ten 10-coin debits.
        assert_eq!(successes, 10);
        assert_eq!(store.wallet_balances(&carol).await?.total(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn credit_kinds_target_the_right_balance() -> Result<()> {
        let store = InMemoryLedger::new();
        let dave = user("dave");

        store
            .credit(&dave, 40, TransactionKind::Purchase, "coin pack", Metadata::new())
            .await?;
        store
            .credit(&dave, 15, TransactionKind::Earning, "referral bonus", Metadata::new())
            .await?;

        assert_eq!(store.wallet_balances(&dave).await?, WalletBalances::new(40, 15));

        let err = store
            .credit(&dave, 5, TransactionKind::Debit, "bad", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidKind { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn double_toggle_restores_original_state() -> Result<()> {
        let store = InMemoryLedger::new();
        let erin = user("erin");
        let concert = event("concert-1");

        // someone else already favorited the event
        store.toggle_bookmark(&user("frank"), &concert).await?;

        let first = store.toggle_bookmark(&erin, &concert).await?;
        assert!(first.is_bookmarked);
        assert_eq!(first.count, 2);

        let second = store.toggle_bookmark(&erin, &concert).await?;
        assert!(!second.is_bookmarked);
        assert_eq!(second.count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn withdrawal_status_transitions_are_validated() -> Result<()> {
        let store = InMemoryLedger::new();
        let request = WithdrawalRequest::new(user("org-1"), 10_000, Utc::now());
        store.create_withdrawal(&request).await?;

        let approved = store
            .set_withdrawal_status(request.id, WithdrawalStatus::Approved)
            .await?;
        assert_eq!(approved.status, WithdrawalStatus::Approved);

        let err = store
            .set_withdrawal_status(request.id, WithdrawalStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        let paid = store
            .set_withdrawal_status(request.id, WithdrawalStatus::Paid)
            .await?;
        assert_eq!(paid.status, WithdrawalStatus::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn latest_rate_returns_most_recent_row() -> Result<()> {
        let store = InMemoryLedger::new();
        assert_eq!(store.latest_rate().await?, None);

        store.push_rate(100).await;
        store.push_rate(250).await;
        assert_eq!(store.latest_rate().await?, Some(250));
        Ok(())
    }
}
