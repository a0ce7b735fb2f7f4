//! HTTP API, mounted under `/api/v1`.

use axum::Router;

use crate::state::AppState;

pub mod notifications;
pub mod orders;

/// Build the versioned API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(orders::router())
        .merge(notifications::router())
}
