use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// Fallback rate used until a rate row has been loaded successfully.
pub const DEFAULT_FCFA_PER_COIN: u64 = 100;

/// Immutable coin/fiat exchange table. Conversions never fail; callers
/// take a copy and compute against it, so a mid-request refresh cannot
/// change the math under them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    fcfa_per_coin: u64,
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            fcfa_per_coin: DEFAULT_FCFA_PER_COIN,
        }
    }
}

impl RateTable {
    /// Rejects a zero rate, which would make every conversion divide by zero.
    pub fn new(fcfa_per_coin: u64) -> Option<Self> {
        if fcfa_per_coin == 0 {
            return None;
        }
        Some(Self { fcfa_per_coin })
    }

    pub fn fcfa_per_coin(&self) -> u64 {
        self.fcfa_per_coin
    }

    /// Ceiling division, floored at one coin. Any positive fiat amount
    /// buys at least one coin.
    pub fn fcfa_to_coins(&self, fcfa: u64) -> u64 {
        fcfa.div_ceil(self.fcfa_per_coin).max(1)
    }

    pub fn coins_to_fcfa(&self, coins: u64) -> u64 {
        coins.saturating_mul(self.fcfa_per_coin)
    }
}

/// Where the latest configured rate comes from. `Ok(None)` means no rate
/// row exists yet.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn latest_rate(&self) -> Result<Option<u64>>;
}

#[derive(Debug, Clone, Copy)]
pub struct RateSnapshot {
    pub table: RateTable,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Holds the current table and swaps it on successful refresh. A failed
/// or empty fetch keeps the previous table; callers never observe a
/// missing rate.
pub struct RateProvider {
    current: RwLock<RateSnapshot>,
}

impl RateProvider {
    pub fn new(initial: RateTable) -> Self {
        Self {
            current: RwLock::new(RateSnapshot {
                table: initial,
                refreshed_at: None,
            }),
        }
    }

    pub async fn table(&self) -> RateTable {
        self.current.read().await.table
    }

    pub async fn snapshot(&self) -> RateSnapshot {
        *self.current.read().await
    }

    /// Pulls the latest rate and returns the table now in effect.
    pub async fn refresh(&self, source: &dyn RateSource) -> RateTable {
        match source.latest_rate().await {
            Ok(Some(rate)) => {
                let Some(table) = RateTable::new(rate) else {
                    warn!("rate source returned zero rate, keeping previous table");
                    return self.table().await;
                };
                let mut guard = self.current.write().await;
                guard.table = table;
                guard.refreshed_at = Some(Utc::now());
                table
            }
            Ok(None) => {
                warn!("no rate row configured, keeping previous table");
                self.table().await
            }
            Err(err) => {
                warn!("failed to fetch latest rate: {err}, keeping previous table");
                self.table().await
            }
        }
    }
}

impl Default for RateProvider {
    fn default() -> Self {
        Self::new(RateTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Result<Option<u64>, String>);

    #[async_trait]
    impl RateSource for FixedSource {
        async fn latest_rate(&self) -> Result<Option<u64>> {
            match &self.0 {
                Ok(value) => Ok(*value),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    #[test]
    fn fcfa_to_coins_rounds_up_and_never_returns_zero() {
        let table = RateTable::new(100).unwrap();
        assert_eq!(table.fcfa_to_coins(0), 1);
        assert_eq!(table.fcfa_to_coins(1), 1);
        assert_eq!(table.fcfa_to_coins(100), 1);
        assert_eq!(table.fcfa_to_coins(101), 2);
        assert_eq!(table.fcfa_to_coins(250), 3);
    }

    #[test]
    fn round_trip_never_undershoots() {
        let table = RateTable::new(100).unwrap();
        for fcfa in [0, 1, 99, 100, 101, 999, 1_000, 12_345] {
            let coins = table.fcfa_to_coins(fcfa);
            assert!(
                table.coins_to_fcfa(coins) >= fcfa,
                "round trip undershot for {fcfa}"
            );
        }
    }

    #[test]
    fn coins_to_fcfa_is_exact_multiplication() {
        let table = RateTable::new(250).unwrap();
        assert_eq!(table.coins_to_fcfa(4), 1_000);
        assert_eq!(table.coins_to_fcfa(0), 0);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateTable::new(0).is_none());
    }

    #[tokio::test]
    async fn refresh_swaps_table_on_success() {
        let provider = RateProvider::default();
        let table = provider.refresh(&FixedSource(Ok(Some(250)))).await;
        assert_eq!(table.fcfa_per_coin(), 250);
        assert!(provider.snapshot().await.refreshed_at.is_some());
    }

    #[tokio::test]
    async fn refresh_keeps_previous_table_on_failure() {
        let provider = RateProvider::new(RateTable::new(150).unwrap());

        let table = provider.refresh(&FixedSource(Err("down".to_owned()))).await;
        assert_eq!(table.fcfa_per_coin(), 150);

        let table = provider.refresh(&FixedSource(Ok(None))).await;
        assert_eq!(table.fcfa_per_coin(), 150);

        let table = provider.refresh(&FixedSource(Ok(Some(0)))).await;
        assert_eq!(table.fcfa_per_coin(), 150);

        assert!(provider.snapshot().await.refreshed_at.is_none());
    }
}
