use anyhow::Result;
use async_trait::async_trait;
use axum::{Json, extract::State, http::HeaderMap};
use cl_api_types::RateResponse;
use cl_rates::RateSource;
use cl_storage::LedgerStore;
use std::sync::Arc;

use crate::retry::{RetryPolicy, retry_idempotent};
use crate::{ApiResult, AppState, auth};

/// Bridges the store's rate rows into the rate provider, retrying the
/// read with backoff. The provider still keeps the previous table if all
/// attempts fail.
pub(crate) struct StoreRateSource {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl StoreRateSource {
    pub(crate) fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl RateSource for StoreRateSource {
    async fn latest_rate(&self) -> Result<Option<u64>> {
        retry_idempotent("latest_rate", &self.policy, || self.store.latest_rate()).await
    }
}

pub(crate) async fn current_rate(State(state): State<AppState>) -> ApiResult<RateResponse> {
    let snapshot = state.rates.snapshot().await;
    Ok(Json(RateResponse {
        fcfa_per_coin: snapshot.table.fcfa_per_coin(),
        refreshed_at: snapshot.refreshed_at,
    }))
}

pub(crate) async fn refresh_rate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<RateResponse> {
    let _admin = auth::require_admin(&state, &headers, "refresh_rate")?;

    let source = StoreRateSource::new(Arc::clone(state.core.store()));
    state.rates.refresh(&source).await;

    let snapshot = state.rates.snapshot().await;
    Ok(Json(RateResponse {
        fcfa_per_coin: snapshot.table.fcfa_per_coin(),
        refreshed_at: snapshot.refreshed_at,
    }))
}
