use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dlvr_core::events::{DomainEvent, DomainSignal};
use dlvr_sdk::objects::{NotificationType, PublishSignalRequest};
use time::OffsetDateTime;

use super::NotificationApiError;
use crate::state::AppState;

/// `POST /users/{user_id}/notifications` — raise a payment, delivery or
/// system signal for the user.
///
/// The signal is queued for the fanout and `202 Accepted` returned right
/// away. Publishing the same `dedupeKey` again is harmless.
pub(super) async fn publish_signal(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PublishSignalRequest>,
) -> Result<StatusCode, NotificationApiError> {
    let kind = request.kind;
    let signal = DomainSignal {
        user_id: user_id.into(),
        order_id: request.order_id,
        dedupe_key: request.dedupe_key,
        title: request.title,
        message: request.message,
        data: request.data,
        occurred_at: OffsetDateTime::now_utc(),
        urgent: request.urgent,
    };
    let event = match kind {
        NotificationType::OrderStatus => return Err(NotificationApiError::StatusSignal),
        NotificationType::PaymentUpdate => DomainEvent::PaymentUpdate(signal),
        NotificationType::DeliveryUpdate => DomainEvent::DeliveryUpdate(signal),
        NotificationType::SystemNotification => DomainEvent::System(signal),
    };

    state
        .events
        .send(event)
        .await
        .map_err(|_| NotificationApiError::Unavailable)?;
    Ok(StatusCode::ACCEPTED)
}
