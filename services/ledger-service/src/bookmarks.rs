use axum::{Json, extract::State};
use cl_api_types::{BookmarkToggleRequest, BookmarkToggleResponse};

use crate::{ApiResult, AppState, bad_request, internal_error};

/// Server-side favorite flip. The response is authoritative: clients
/// that staged an optimistic flip reconcile against it.
pub(crate) async fn toggle(
    State(state): State<AppState>,
    Json(request): Json<BookmarkToggleRequest>,
) -> ApiResult<BookmarkToggleResponse> {
    if request.user_id.0.trim().is_empty() {
        return Err(bad_request("user_id is required"));
    }
    if request.event_id.0.trim().is_empty() {
        return Err(bad_request("event_id is required"));
    }

    let bookmark = state
        .core
        .toggle_bookmark(&request.user_id, &request.event_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(BookmarkToggleResponse {
        event_id: request.event_id,
        is_bookmarked: bookmark.is_bookmarked,
        count: bookmark.count,
    }))
}
