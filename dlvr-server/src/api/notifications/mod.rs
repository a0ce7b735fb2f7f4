//! Notification delivery handlers.
//!
//! These endpoints are called by the client-side transport manager and by
//! collaborators that raise payment, delivery or system signals.
//!
//! # Endpoints
//!
//! - `GET    /users/{user_id}/notifications/ws`          – notification stream
//! - `GET    /users/{user_id}/notifications?after=`      – poll for notifications
//! - `POST   /users/{user_id}/notifications`             – publish a signal
//! - `POST   /users/{user_id}/notifications/{id}/read`   – mark one as read
//! - `DELETE /users/{user_id}/notifications`             – clear all

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use dlvr_core::entities::{NotificationStore, StoreError, StoredNotification};
use dlvr_sdk::objects::NotificationId;

use crate::state::AppState;

mod manage;
mod poll;
mod signals;
mod ws;

/// Build the notification router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users/{user_id}/notifications",
            get(poll::poll_notifications)
                .post(signals::publish_signal)
                .delete(manage::clear_notifications),
        )
        .route(
            "/users/{user_id}/notifications/ws",
            get(ws::notification_stream),
        )
        .route(
            "/users/{user_id}/notifications/{notification_id}/read",
            post(manage::mark_read),
        )
}

/// Flag the records that had not reached the user yet as delivered.
async fn mark_undelivered(
    store: &dyn NotificationStore,
    records: &[StoredNotification],
) -> Result<u64, StoreError> {
    let ids: Vec<NotificationId> = records
        .iter()
        .filter(|r| !r.delivered)
        .map(|r| r.notification.id.clone())
        .collect();
    store.mark_delivered(&ids).await
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in notification handlers.
#[derive(Debug)]
enum NotificationApiError {
    Store(StoreError),
    NotFound,
    /// Order status notifications come from the lifecycle scheduler only.
    StatusSignal,
    /// The fanout is gone; the server is shutting down.
    Unavailable,
}

impl From<StoreError> for NotificationApiError {
    fn from(e: StoreError) -> Self {
        NotificationApiError::Store(e)
    }
}

impl IntoResponse for NotificationApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            NotificationApiError::Store(e) => {
                tracing::error!(error = %e, "Notification store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            NotificationApiError::NotFound => {
                (StatusCode::NOT_FOUND, "notification not found").into_response()
            }
            NotificationApiError::StatusSignal => (
                StatusCode::BAD_REQUEST,
                "order status notifications cannot be published directly",
            )
                .into_response(),
            NotificationApiError::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response()
            }
        }
    }
}
