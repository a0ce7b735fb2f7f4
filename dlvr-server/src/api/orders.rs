//! Order simulation handlers.
//!
//! These endpoints are called by the order collaborator once an order is
//! confirmed.
//!
//! # Endpoints
//!
//! - `POST /orders/{order_id}/simulation` – start the lifecycle simulation
//! - `GET  /orders/{order_id}/simulation` – inspect an active simulation
//! - `POST /orders/{order_id}/cancel`     – cancel the simulation

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use dlvr_core::processors::SchedulerError;
use dlvr_sdk::objects::StartSimulationRequest;
use uuid::Uuid;

use crate::state::AppState;

/// Build the order router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/orders/{order_id}/simulation",
            post(start_simulation).get(get_simulation),
        )
        .route("/orders/{order_id}/cancel", post(cancel_simulation))
}

/// `POST /orders/{order_id}/simulation` — start simulating a confirmed order.
///
/// Responds `202 Accepted` with the cook and delivery estimates. The
/// `order_confirmed` notification follows immediately.
async fn start_simulation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<StartSimulationRequest>,
) -> Result<impl IntoResponse, OrderApiError> {
    let accepted = state.scheduler.start(order_id, &request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// `GET /orders/{order_id}/simulation` — snapshot of an active plan.
async fn get_simulation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, OrderApiError> {
    let snapshot = state
        .scheduler
        .snapshot(order_id)
        .await
        .ok_or(OrderApiError::NotFound)?;
    Ok(Json(snapshot))
}

/// `POST /orders/{order_id}/cancel` — cancel a simulation.
///
/// Always `204 No Content`: cancelling an unknown, finished or already
/// cancelled order is a no-op.
async fn cancel_simulation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> StatusCode {
    if !state.scheduler.cancel(order_id).await {
        tracing::debug!(%order_id, "Cancel request had no effect");
    }
    StatusCode::NO_CONTENT
}

/// Errors that can occur in order handlers.
#[derive(Debug)]
enum OrderApiError {
    Scheduler(SchedulerError),
    /// No active simulation for the order.
    NotFound,
}

impl From<SchedulerError> for OrderApiError {
    fn from(e: SchedulerError) -> Self {
        OrderApiError::Scheduler(e)
    }
}

impl IntoResponse for OrderApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            OrderApiError::Scheduler(e @ SchedulerError::AlreadyActive(_)) => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            OrderApiError::Scheduler(e @ SchedulerError::ShutDown) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            OrderApiError::NotFound => {
                (StatusCode::NOT_FOUND, "no active simulation for order").into_response()
            }
        }
    }
}
