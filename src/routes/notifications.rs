use axum::extract::State;
use axum::Json;

use super::error::ApiError;
use super::extract::AuthUser;
use crate::app_state::AppState;
use crate::models::notification::{MarkReadRequest, MarkReadResponse, Notification};

/// GET /api/notifications: the caller's batch progress records, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state.notifications.list_notifications(user.id).await?;
    Ok(Json(notifications))
}

/// POST /api/notifications: mark the given ids read. Ids owned by anyone
/// else are silently skipped.
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let updated = state.notifications.mark_read(user.id, &input.ids).await?;
    tracing::debug!(
        user_id = %user.id,
        requested = input.ids.len(),
        updated,
        "Notifications marked read"
    );
    Ok(Json(MarkReadResponse { updated }))
}
