use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use dlvr_sdk::objects::PollResponse;
use serde::Deserialize;

use super::{NotificationApiError, mark_undelivered};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct PollQuery {
    /// `nextCursor` of the previous poll.
    #[serde(default)]
    after: Option<u64>,
}

/// `GET /users/{user_id}/notifications?after=<cursor>` — polling transport.
///
/// With a cursor, returns everything stored after it, oldest first. Without
/// one, returns what has not been delivered yet. Either way the response
/// carries the cursor to resume from, and returned records are marked
/// delivered.
pub(super) async fn poll_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<impl IntoResponse, NotificationApiError> {
    state.presence.record_poll(&user_id);
    let limit = state.stream.page_limit;

    let (records, next_cursor) = match query.after {
        Some(after) => {
            let records = state.store.list_after(&user_id, after, limit).await?;
            let next = records.last().map_or(after, |r| r.cursor);
            (records, next)
        }
        None => {
            // Read the head before listing: anything stored in between is
            // past the returned cursor and shows up on the next poll.
            let head = state.store.latest_cursor(&user_id).await?;
            let records = state.store.list_undelivered(&user_id, limit).await?;
            let next = match records.last() {
                Some(last) if records.len() >= limit => last.cursor,
                _ => head,
            };
            (records, next)
        }
    };
    let delivered = mark_undelivered(state.store.as_ref(), &records).await?;

    tracing::debug!(
        user_id = %user_id,
        returned = records.len(),
        newly_delivered = delivered,
        next_cursor,
        "Served notification poll"
    );

    Ok(Json(PollResponse {
        notifications: records.into_iter().map(|r| r.notification).collect(),
        next_cursor,
    }))
}
