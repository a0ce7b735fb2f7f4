use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use compact_str::CompactString;
use dlvr_sdk::objects::{Notification, StreamCloseCode};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::mark_undelivered;
use crate::state::AppState;

/// `GET /users/{user_id}/notifications/ws` — notification stream.
///
/// Upgrades the HTTP connection to a WebSocket and pushes one
/// [`Notification`] JSON text frame per notification addressed to the user.
/// Notifications stored while the user had no connection are sent first.
/// The server pings on a fixed interval and ignores client frames other
/// than close.
pub(super) async fn notification_stream(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, state, user_id.into()))
}

/// Why the relay loop ended.
enum StreamEnd {
    ClientGone,
    Close { code: u16, reason: &'static str },
}

/// Background task that drives a single stream connection.
async fn handle_stream(mut socket: WebSocket, state: AppState, user_id: CompactString) {
    let _presence = state.presence.stream_opened(&user_id);
    tracing::info!(user_id = %user_id, "Notification stream opened");

    // Subscribe before catching up so nothing published in between is
    // missed. Overlap is removed by the client's id de-duplication.
    let mut updates = BroadcastStream::new(state.bus.subscribe());

    let end = match catch_up(&mut socket, &state, &user_id).await {
        Ok(()) => relay(&mut socket, &state, &user_id, &mut updates).await,
        Err(end) => end,
    };

    match end {
        StreamEnd::ClientGone => {}
        StreamEnd::Close { code, reason } => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })))
                .await;
        }
    }
    tracing::info!(user_id = %user_id, "Notification stream closed");
}

async fn relay(
    socket: &mut WebSocket,
    state: &AppState,
    user_id: &str,
    updates: &mut BroadcastStream<Notification>,
) -> StreamEnd {
    let mut shutdown_rx = state.shutdown_rx.clone();
    if *shutdown_rx.borrow_and_update() {
        return going_away();
    }

    let period = state.stream.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return going_away();
                }
            }

            update = updates.next() => {
                match update {
                    Some(Ok(notification)) if notification.user_id == user_id => {
                        if let Err(end) = send_notification(socket, state, notification).await {
                            return end;
                        }
                    }
                    Some(Ok(_)) => {
                        continue;
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(
                            user_id = %user_id,
                            skipped,
                            "Stream subscriber lagged, catching up from store"
                        );
                        if let Err(end) = catch_up(socket, state, user_id).await {
                            return end;
                        }
                    }
                    None => return going_away(),
                }
            }

            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Default::default())).await.is_err() {
                    return StreamEnd::ClientGone;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        return StreamEnd::ClientGone;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Send every stored notification the user has not received yet, one page
/// at a time.
async fn catch_up(socket: &mut WebSocket, state: &AppState, user_id: &str) -> Result<(), StreamEnd> {
    let limit = state.stream.page_limit;
    let mut replayed = 0;
    loop {
        let page = state
            .store
            .list_undelivered(user_id, limit)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %user_id, "Stream: failed to load backlog");
                internal_error()
            })?;
        if page.is_empty() {
            break;
        }

        for record in &page {
            send_json(socket, &record.notification)
                .await
                .map_err(|()| StreamEnd::ClientGone)?;
        }
        replayed += page.len();

        // The next page is read from the same query, so a page that cannot
        // be marked would be sent forever.
        mark_undelivered(state.store.as_ref(), &page)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %user_id, "Stream: failed to mark backlog delivered");
                internal_error()
            })?;
        if page.len() < limit {
            break;
        }
    }

    if replayed > 0 {
        tracing::debug!(user_id = %user_id, replayed, "Stream: backlog replayed");
    }
    Ok(())
}

async fn send_notification(
    socket: &mut WebSocket,
    state: &AppState,
    notification: Notification,
) -> Result<(), StreamEnd> {
    send_json(socket, &notification)
        .await
        .map_err(|()| StreamEnd::ClientGone)?;
    if let Err(e) = state
        .store
        .mark_delivered(std::slice::from_ref(&notification.id))
        .await
    {
        tracing::error!(
            error = %e,
            notification_id = %notification.id,
            "Stream: failed to mark notification delivered"
        );
    }
    Ok(())
}

fn internal_error() -> StreamEnd {
    StreamEnd::Close {
        code: StreamCloseCode::INTERNAL_ERROR,
        reason: "internal error",
    }
}

fn going_away() -> StreamEnd {
    StreamEnd::Close {
        code: StreamCloseCode::GOING_AWAY,
        reason: "server shutting down",
    }
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
