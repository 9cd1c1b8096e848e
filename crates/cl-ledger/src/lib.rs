use chrono::NaiveDate;
use cl_api_types::WithdrawalStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Dual-balance wallet: `paid` coins were bought with real money, `free`
/// coins are promotional. Unsigned fields make the non-negativity
/// invariant structural.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalances {
    pub paid: u64,
    pub free: u64,
}

impl WalletBalances {
    pub fn new(paid: u64, free: u64) -> Self {
        Self { paid, free }
    }

    pub fn total(&self) -> u64 {
        self.paid.saturating_add(self.free)
    }

    pub fn after_debit(&self, allocation: DebitAllocation) -> WalletBalances {
        WalletBalances {
            paid: self.paid - allocation.paid_used,
            free: self.free - allocation.free_used,
        }
    }
}

/// How a spend splits across the two balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitAllocation {
    pub free_used: u64,
    pub paid_used: u64,
}

/// Free-balance-first split. Returns `None` when the wallet cannot cover
/// `amount`; stores must call this inside the same critical section as
/// the balance write.
pub fn allocate_debit(balances: WalletBalances, amount: u64) -> Option<DebitAllocation> {
    if balances.total() < amount {
        return None;
    }
    let free_used = balances.free.min(amount);
    Some(DebitAllocation {
        free_used,
        paid_used: amount - free_used,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitOutcome {
    pub transaction_id: Uuid,
    pub allocation: DebitAllocation,
    pub balances_after: WalletBalances,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditOutcome {
    pub transaction_id: Uuid,
    pub balances_after: WalletBalances,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("{kind} is not valid for this operation")]
    InvalidKind { kind: &'static str },

    #[error("invalid withdrawal status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    #[error("withdrawals are closed today")]
    WithdrawalsClosed { next_open: Option<NaiveDate> },

    #[error("withdrawal request not found: {0}")]
    WithdrawalNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_spends_free_balance_first() {
        let balances = WalletBalances::new(100, 20);
        let allocation = allocate_debit(balances, 30).unwrap();

        assert_eq!(allocation.free_used, 20);
        assert_eq!(allocation.paid_used, 10);

        let after = balances.after_debit(allocation);
        assert_eq!(after.paid, 90);
        assert_eq!(after.free, 0);
    }

    #[test]
    fn debit_within_free_balance_leaves_paid_untouched() {
        let balances = WalletBalances::new(50, 40);
        let allocation = allocate_debit(balances, 25).unwrap();

        assert_eq!(allocation.free_used, 25);
        assert_eq!(allocation.paid_used, 0);
        assert_eq!(balances.after_debit(allocation), WalletBalances::new(50, 15));
    }

    #[test]
    fn debit_fails_exactly_when_total_is_short() {
        assert!(allocate_debit(WalletBalances::new(0, 0), 1).is_none());
        assert!(allocate_debit(WalletBalances::new(10, 5), 16).is_none());
        assert!(allocate_debit(WalletBalances::new(10, 5), 15).is_some());
    }

    #[test]
    fn conservation_holds_across_allocations() {
        for (paid, free, amount) in [(100, 20, 30), (0, 50, 50), (7, 0, 3), (1, 1, 2)] {
            let balances = WalletBalances::new(paid, free);
            let allocation = allocate_debit(balances, amount).unwrap();
            let after = balances.after_debit(allocation);

            assert_eq!(after.total(), balances.total() - amount);
            assert_eq!(after.free, free.saturating_sub(amount));
            assert_eq!(allocation.free_used + allocation.paid_used, amount);
        }
    }
}
