use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use cl_api_types::{
    ScheduleResponse, ScheduleUpdateRequest, WithdrawalStatus, WithdrawalStatusUpdateRequest,
    WithdrawalSubmitRequest,
};
use cl_withdrawals::{WithdrawalRequest, WithdrawalSchedule};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notify::WithdrawalDecisionEvent;
use crate::retry::{RetryPolicy, retry_idempotent};
use crate::{ApiResult, AppState, auth, bad_request, internal_error, ledger_error};

pub(crate) async fn get_schedule(State(state): State<AppState>) -> ApiResult<ScheduleResponse> {
    let schedule = retry_idempotent("withdrawal_schedule", &RetryPolicy::default(), || {
        state.core.withdrawal_schedule()
    })
    .await
    .map_err(internal_error)?
    .ok_or_else(|| crate::not_found("no withdrawal schedule is configured"))?;

    let today = Utc::now().date_naive();
    Ok(Json(ScheduleResponse {
        allowed_days: schedule.allowed_days(),
        open_today: schedule.is_open(today),
        next_open_date: schedule.next_open_date(today),
    }))
}

pub(crate) async fn put_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ScheduleUpdateRequest>,
) -> ApiResult<ScheduleResponse> {
    let _admin = auth::require_admin(&state, &headers, "put_schedule")?;

    let schedule = WithdrawalSchedule::new(request.allowed_days)
        .map_err(|err| bad_request(&err.to_string()))?;

    state
        .core
        .save_withdrawal_schedule(&schedule)
        .await
        .map_err(internal_error)?;

    let today = Utc::now().date_naive();
    Ok(Json(ScheduleResponse {
        allowed_days: schedule.allowed_days(),
        open_today: schedule.is_open(today),
        next_open_date: schedule.next_open_date(today),
    }))
}

pub(crate) async fn submit(
    State(state): State<AppState>,
    Json(request): Json<WithdrawalSubmitRequest>,
) -> ApiResult<WithdrawalRequest> {
    if request.organizer_id.0.trim().is_empty() {
        return Err(bad_request("organizer_id is required"));
    }

    let today = Utc::now().date_naive();
    let created = state
        .core
        .submit_withdrawal(&request.organizer_id, request.amount_gross, today)
        .await
        .map_err(ledger_error)?;

    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub(crate) struct WithdrawalsQuery {
    status: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WithdrawalsResponse {
    pub(crate) withdrawals: Vec<WithdrawalRequest>,
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<WithdrawalsQuery>,
) -> ApiResult<WithdrawalsResponse> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            WithdrawalStatus::parse(raw)
                .ok_or_else(|| bad_request(&format!("unknown withdrawal status: {raw}")))?,
        ),
    };

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let withdrawals = state
        .core
        .list_withdrawals(status, limit)
        .await
        .map_err(internal_error)?;

    Ok(Json(WithdrawalsResponse { withdrawals }))
}

pub(crate) async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WithdrawalRequest> {
    let request = state
        .core
        .withdrawal(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| crate::not_found(&format!("withdrawal request not found: {id}")))?;

    Ok(Json(request))
}

pub(crate) async fn decide(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<WithdrawalStatusUpdateRequest>,
) -> ApiResult<WithdrawalRequest> {
    let _admin = auth::require_admin(&state, &headers, "decide_withdrawal")?;

    let updated = state
        .core
        .decide_withdrawal(id, request.status)
        .await
        .map_err(ledger_error)?;

    state.callback.notify_decision(&WithdrawalDecisionEvent {
        id: updated.id,
        organizer_id: updated.organizer_id.0.clone(),
        status: updated.status,
        amount_gross: updated.amount_gross,
        amount_net: updated.amount_net,
        decided_at: Utc::now(),
    });

    Ok(Json(updated))
}
