use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use cl_api_types::{
    CreditRequest, CreditResponse, DebitRequest, DebitResponse, TransactionKind,
    TransactionsResponse, UserId, WalletBalancesResponse, WalletTotalResponse,
};
use serde::Deserialize;
use tracing::warn;

use crate::{ApiResult, AppState, auth, bad_request, internal_error, ledger_error};

pub(crate) async fn wallet_balances(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<WalletBalancesResponse> {
    let user = UserId(user_id);

    // Read failures degrade to zeros instead of erroring; the flag and
    // the log line keep an outage distinguishable from an empty wallet.
    let (balances, degraded) = match state.core.balances(&user).await {
        Ok(balances) => (balances, false),
        Err(err) => {
            warn!(
                "balance read failed for {}: {err:#}. Degrading to zero balances",
                user.0
            );
            (Default::default(), true)
        }
    };

    Ok(Json(WalletBalancesResponse {
        user_id: user,
        paid: balances.paid,
        free: balances.free,
        total: balances.total(),
        degraded,
    }))
}

/// Legacy total-only read, preserved for call sites that never learned
/// about the paid/free split.
pub(crate) async fn wallet_total(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<WalletTotalResponse> {
    let user = UserId(user_id);
    let total = match state.core.balances(&user).await {
        Ok(balances) => balances.total(),
        Err(err) => {
            warn!(
                "balance read failed for {}: {err:#}. Degrading to zero total",
                user.0
            );
            0
        }
    };

    Ok(Json(WalletTotalResponse {
        user_id: user,
        total,
    }))
}

pub(crate) async fn wallet_debit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<DebitRequest>,
) -> ApiResult<DebitResponse> {
    if request.reason.trim().is_empty() {
        return Err(bad_request("reason is required"));
    }

    let user = UserId(user_id);
    let outcome = state
        .core
        .debit(&user, request.amount, &request.reason, request.metadata)
        .await
        .map_err(ledger_error)?;

    Ok(Json(DebitResponse {
        transaction_id: outcome.transaction_id,
        free_used: outcome.allocation.free_used,
        paid_used: outcome.allocation.paid_used,
        paid_balance: outcome.balances_after.paid,
        free_balance: outcome.balances_after.free,
    }))
}

/// Administrative credit pipeline: purchases confirmed by the payment
/// verifier, earnings, manual grants, and reversals all land here.
pub(crate) async fn wallet_credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(request): Json<CreditRequest>,
) -> ApiResult<CreditResponse> {
    let _admin = auth::require_admin(&state, &headers, "wallet_credit")?;

    if request.description.trim().is_empty() {
        return Err(bad_request("description is required"));
    }

    let user = UserId(user_id);
    let (transaction_id, balances_after) = match request.kind {
        TransactionKind::CreditReversal => {
            let outcome = state
                .core
                .reverse_credit(&user, request.amount, &request.description, request.metadata)
                .await
                .map_err(ledger_error)?;
            (outcome.transaction_id, outcome.balances_after)
        }
        TransactionKind::Debit => {
            return Err(bad_request("use the debit endpoint for spends"));
        }
        kind => {
            let outcome = state
                .core
                .credit(&user, request.amount, kind, &request.description, request.metadata)
                .await
                .map_err(ledger_error)?;
            (outcome.transaction_id, outcome.balances_after)
        }
    };

    Ok(Json(CreditResponse {
        transaction_id,
        paid_balance: balances_after.paid,
        free_balance: balances_after.free,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionsQuery {
    limit: Option<usize>,
    kind: Option<String>,
}

pub(crate) async fn wallet_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<TransactionsResponse> {
    let kind = match query.kind.as_deref() {
        None => None,
        Some(raw) => Some(
            TransactionKind::parse(raw)
                .ok_or_else(|| bad_request(&format!("unknown transaction kind: {raw}")))?,
        ),
    };

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let user = UserId(user_id);

    let transactions = state
        .core
        .transactions(&user, limit, kind)
        .await
        .map_err(internal_error)?;

    Ok(Json(TransactionsResponse { transactions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app;
    use crate::test_support::{ErrorBody, get, json_request, read_json, test_state};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn balances_read_absent_wallet_as_zero() {
        let (state, _store) = test_state();
        let response = app(state)
            .oneshot(get("/wallet/ghost/balances"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: WalletBalancesResponse = read_json(response).await;
        assert_eq!(body.total, 0);
        assert!(!body.degraded);
    }

    #[tokio::test]
    async fn debit_splits_and_reports_new_balances() {
        let (state, store) = test_state();
        store.seed_wallet(&UserId("alice".to_owned()), 100, 20).await;

        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/wallet/alice/debit",
                &json!({"amount": 30, "reason": "raffle ticket"}),
                false,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: DebitResponse = read_json(response).await;
        assert_eq!(body.free_used, 20);
        assert_eq!(body.paid_used, 10);
        assert_eq!(body.paid_balance, 90);
        assert_eq!(body.free_balance, 0);
    }

    #[tokio::test]
    async fn debit_beyond_funds_is_conflict_and_mutates_nothing() {
        let (state, store) = test_state();
        let alice = UserId("alice".to_owned());
        store.seed_wallet(&alice, 5, 0).await;

        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/wallet/alice/debit",
                &json!({"amount": 6, "reason": "vote pack"}),
                false,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: ErrorBody = read_json(response).await;
        assert_eq!(body.code, "insufficient_balance");

        let balances = state.core.balances(&alice).await.unwrap();
        assert_eq!(balances.total(), 5);
    }

    #[tokio::test]
    async fn zero_amount_debit_is_bad_request() {
        let (state, _store) = test_state();
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/wallet/alice/debit",
                &json!({"amount": 0, "reason": "nothing"}),
                false,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn credit_requires_admin() {
        let (state, _store) = test_state();
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/wallet/alice/credit",
                &json!({"amount": 10, "kind": "earning", "description": "bonus"}),
                false,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_credit_then_transactions_shows_journal() {
        let (state, _store) = test_state();
        let application = app(state);

        let response = application
            .clone()
            .oneshot(json_request(
                "POST",
                "/wallet/bob/credit",
                &json!({"amount": 40, "kind": "purchase", "description": "coin pack"}),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: CreditResponse = read_json(response).await;
        assert_eq!(body.paid_balance, 40);
        assert_eq!(body.free_balance, 0);

        let response = application
            .oneshot(get("/wallet/bob/transactions?kind=purchase"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: TransactionsResponse = read_json(response).await;
        assert_eq!(body.transactions.len(), 1);
        assert_eq!(body.transactions[0].amount, 40);
    }

    #[tokio::test]
    async fn unknown_transaction_kind_is_bad_request() {
        let (state, _store) = test_state();
        let response = app(state)
            .oneshot(get("/wallet/bob/transactions?kind=refund"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
