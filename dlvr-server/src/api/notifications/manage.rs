use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use dlvr_sdk::objects::NotificationId;

use super::NotificationApiError;
use crate::state::AppState;

/// `POST /users/{user_id}/notifications/{notification_id}/read`
pub(super) async fn mark_read(
    State(state): State<AppState>,
    Path((user_id, notification_id)): Path<(String, String)>,
) -> Result<StatusCode, NotificationApiError> {
    let id = NotificationId(notification_id.into());
    if state.store.mark_read(&user_id, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(NotificationApiError::NotFound)
    }
}

/// `DELETE /users/{user_id}/notifications` — remove every notification of
/// the user.
pub(super) async fn clear_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, NotificationApiError> {
    let removed = state.store.clear(&user_id).await?;
    tracing::info!(user_id = %user_id, removed, "Notifications cleared");
    Ok(StatusCode::NO_CONTENT)
}
