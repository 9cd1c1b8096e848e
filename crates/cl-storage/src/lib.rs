use anyhow::Result;
use async_trait::async_trait;
use cl_api_types::{EventId, Metadata, TransactionKind, TransactionRecord, UserId, WithdrawalStatus};
use cl_ledger::{CreditOutcome, DebitOutcome, LedgerError, WalletBalances};
use cl_withdrawals::{WithdrawalRequest, WithdrawalSchedule};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod memory;

pub use memory::InMemoryLedger;

/// Authoritative bookmark state after a server-side toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkState {
    pub is_bookmarked: bool,
    pub count: u64,
}

/// The ledger backend. Every implementation must perform the balance
/// guard, the decrement, and the journal append of a spend as one atomic
/// unit; there is no unconditional-overwrite path.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Absent wallet row reads as zero balances, not as an error.
    async fn wallet_balances(&self, user: &UserId) -> Result<WalletBalances>;

    /// Atomic conditional spend, free balance first. Journals a record of
    /// `kind` with the negated amount and `{free_used, paid_used}` merged
    /// into `metadata`. `kind` must be `Debit` or `CreditReversal`.
    async fn debit(
        &self,
        user: &UserId,
        amount: u64,
        kind: TransactionKind,
        description: &str,
        metadata: Metadata,
    ) -> Result<DebitOutcome, LedgerError>;

    /// Adds coins: `Purchase` to the paid balance, `Earning` and
    /// `ManualCredit` to the free balance.
    async fn credit(
        &self,
        user: &UserId,
        amount: u64,
        kind: TransactionKind,
        description: &str,
        metadata: Metadata,
    ) -> Result<CreditOutcome, LedgerError>;

    /// Newest first, optionally filtered by kind.
    async fn transactions(
        &self,
        user: &UserId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<TransactionRecord>>;

    /// Most recently configured coin rate, if any row exists.
    async fn latest_rate(&self) -> Result<Option<u64>>;

    /// Server-side favorite flip. Idempotent in the sense that two
    /// sequential toggles restore the original state and count.
    async fn toggle_bookmark(&self, user: &UserId, event: &EventId) -> Result<BookmarkState>;

    async fn bookmark_count(&self, event: &EventId) -> Result<u64>;

    async fn withdrawal_schedule(&self) -> Result<Option<WithdrawalSchedule>>;

    async fn save_withdrawal_schedule(&self, schedule: &WithdrawalSchedule) -> Result<()>;

    async fn create_withdrawal(&self, request: &WithdrawalRequest) -> Result<()>;

    async fn withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>>;

    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>>;

    /// Validates the lifecycle transition before writing; returns the
    /// updated request.
    async fn set_withdrawal_status(
        &self,
        id: Uuid,
        next: WithdrawalStatus,
    ) -> Result<WithdrawalRequest, LedgerError>;
}
