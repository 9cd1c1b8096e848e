use chrono::{DateTime, Utc};
use cl_api_types::{UserId, WithdrawalStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform fee withheld from every withdrawal.
pub const WITHDRAWAL_FEE_PERCENT: u64 = 5;

/// Returns `(fees, net)` for a gross amount. Integer percentage, rounded
/// down, so the organizer never pays a fraction of a coin extra. The
/// intermediate product is widened to u128; `fees <= gross / 20` keeps the
/// narrowing cast safe.
pub fn split_fees(amount_gross: u64) -> (u64, u64) {
    let fees = (u128::from(amount_gross) * u128::from(WITHDRAWAL_FEE_PERCENT) / 100) as u64;
    (fees, amount_gross - fees)
}

/// An organizer's payout request. Created as `Pending`; every later status
/// change goes through [`WithdrawalStatus::can_transition_to`] and is
/// performed by an administrative actor only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub organizer_id: UserId,
    pub amount_gross: u64,
    pub fees: u64,
    pub amount_net: u64,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    pub fn new(organizer_id: UserId, amount_gross: u64, requested_at: DateTime<Utc>) -> Self {
        let (fees, amount_net) = split_fees(amount_gross);
        Self {
            id: Uuid::new_v4(),
            organizer_id,
            amount_gross,
            fees,
            amount_net,
            status: WithdrawalStatus::Pending,
            requested_at,
        }
    }
}
