use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub String);

/// Free-form key/value payload attached to journal entries.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earning,
    ManualCredit,
    CreditReversal,
    Debit,
    Purchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earning => "earning",
            TransactionKind::ManualCredit => "manual_credit",
            TransactionKind::CreditReversal => "credit_reversal",
            TransactionKind::Debit => "debit",
            TransactionKind::Purchase => "purchase",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "earning" => Some(TransactionKind::Earning),
            "manual_credit" => Some(TransactionKind::ManualCredit),
            "credit_reversal" => Some(TransactionKind::CreditReversal),
            "debit" => Some(TransactionKind::Debit),
            "purchase" => Some(TransactionKind::Purchase),
            _ => None,
        }
    }

    /// Kinds that add coins to a wallet. `Debit` and `CreditReversal`
    /// remove coins and go through the spend path.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Earning | TransactionKind::ManualCredit | TransactionKind::Purchase
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            "paid" => Some(WithdrawalStatus::Paid),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Rejected | WithdrawalStatus::Paid)
    }

    /// Single authority for the request lifecycle:
    /// `pending -> approved | rejected`, `approved -> paid`.
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (WithdrawalStatus::Pending, WithdrawalStatus::Approved)
                | (WithdrawalStatus::Pending, WithdrawalStatus::Rejected)
                | (WithdrawalStatus::Approved, WithdrawalStatus::Paid)
        )
    }
}

/// Immutable journal entry for a balance change. Negative `amount` is a
/// spend, positive is a credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalancesResponse {
    pub user_id: UserId,
    pub paid: u64,
    pub free: u64,
    pub total: u64,
    /// True when the store read failed and balances degraded to zero.
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTotalResponse {
    pub user_id: UserId,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitRequest {
    pub amount: u64,
    pub reason: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitResponse {
    pub transaction_id: Uuid,
    pub free_used: u64,
    pub paid_used: u64,
    pub paid_balance: u64,
    pub free_balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRequest {
    pub amount: u64,
    pub kind: TransactionKind,
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditResponse {
    pub transaction_id: Uuid,
    pub paid_balance: u64,
    pub free_balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateResponse {
    pub fcfa_per_coin: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub allowed_days: Vec<u8>,
    pub open_today: bool,
    pub next_open_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUpdateRequest {
    pub allowed_days: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalSubmitRequest {
    pub organizer_id: UserId,
    pub amount_gross: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalStatusUpdateRequest {
    pub status: WithdrawalStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkToggleRequest {
    pub user_id: UserId,
    pub event_id: EventId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkToggleResponse {
    pub event_id: EventId,
    pub is_bookmarked: bool,
    pub count: u64,
}
