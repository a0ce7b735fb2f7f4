//! The per-user delivery loop behind a subscription.
//!
//! A session walks a one-way state machine:
//!
//! ```text
//! connecting(stream) -> connected(stream) -> reconnecting -> connecting(stream) ...
//!                                                 |
//!                         (attempts exhausted)    v
//!                                          connecting(polling) -> connected(polling)
//! ```
//!
//! Exactly one transport is active at any time and every network call is
//! awaited inline, so reconnect attempts never overlap and a slow poll makes
//! the next tick get skipped rather than queued. Polling is sticky: once a
//! session falls back it never returns to the stream.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use compact_str::CompactString;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::backoff_delay;
use super::status::{ConnectionStatus, ConnectionType, SessionPhase};
use super::{
    NotificationHandler, NotificationStream, PollTransport, StatusHandler, StreamFrame,
    StreamTransport, TransportConfig, TransportError,
};
use crate::objects::{Notification, NotificationId};

/// How the stream phase of a session ended.
#[derive(Debug, PartialEq, Eq)]
enum PrimaryOutcome {
    Cancelled,
    FallBack,
}

/// Why a connected stream stopped delivering.
enum PumpEnd {
    Cancelled,
    Failed(TransportError),
}

/// Bounded memory of recently delivered notification ids.
struct RecentIds {
    capacity: usize,
    order: VecDeque<NotificationId>,
    members: HashSet<NotificationId>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Remember `id`. Returns `false` if it was already known.
    fn insert(&mut self, id: &NotificationId) -> bool {
        if self.members.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        self.order.push_back(id.clone());
        self.members.insert(id.clone());
        true
    }
}

pub(super) struct Session {
    user_id: CompactString,
    config: TransportConfig,
    stream: Arc<dyn StreamTransport>,
    poll: Arc<dyn PollTransport>,
    on_notification: NotificationHandler,
    on_status: StatusHandler,
    status_tx: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
    seen: RecentIds,
    /// Server cursor returned by the last successful poll.
    cursor: Option<u64>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        user_id: CompactString,
        config: TransportConfig,
        stream: Arc<dyn StreamTransport>,
        poll: Arc<dyn PollTransport>,
        on_notification: NotificationHandler,
        on_status: StatusHandler,
        status_tx: watch::Sender<ConnectionStatus>,
        cancel: CancellationToken,
    ) -> Self {
        let seen = RecentIds::new(config.dedupe_window);
        Self {
            user_id,
            config,
            stream,
            poll,
            on_notification,
            on_status,
            status_tx,
            cancel,
            seen,
            cursor: None,
        }
    }

    /// Drive the session until it is cancelled.
    pub(super) async fn run(mut self) {
        info!(user_id = %self.user_id, "Transport session started");

        if self.run_stream().await == PrimaryOutcome::FallBack {
            info!(
                user_id = %self.user_id,
                attempts = self.config.max_reconnect_attempts,
                "Stream unavailable, falling back to polling"
            );
            self.run_polling().await;
        }

        self.update(ConnectionStatus::mark_disconnected);
        info!(user_id = %self.user_id, "Transport session stopped");
    }

    async fn run_stream(&mut self) -> PrimaryOutcome {
        let mut attempt: u32 = 0;

        loop {
            self.update(|s| {
                s.phase = SessionPhase::Connecting {
                    transport: ConnectionType::Stream,
                }
            });

            let connect = tokio::time::timeout(
                self.config.connect_timeout,
                self.stream.connect(&self.user_id),
            );
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PrimaryOutcome::Cancelled,
                result = connect => result,
            };

            match result {
                Ok(Ok(mut stream)) => {
                    attempt = 0;
                    let now = OffsetDateTime::now_utc();
                    self.update(|s| s.mark_connected(ConnectionType::Stream, now));
                    info!(user_id = %self.user_id, "Stream connected");

                    match self.pump(&mut *stream).await {
                        PumpEnd::Cancelled => return PrimaryOutcome::Cancelled,
                        PumpEnd::Failed(e) => {
                            warn!(user_id = %self.user_id, error = %e, "Stream dropped");
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(user_id = %self.user_id, error = %e, attempt, "Stream connect failed");
                }
                Err(_) => {
                    warn!(
                        user_id = %self.user_id,
                        timeout = ?self.config.connect_timeout,
                        attempt,
                        "Stream connect timed out"
                    );
                }
            }

            if attempt >= self.config.max_reconnect_attempts {
                return PrimaryOutcome::FallBack;
            }

            let delay = backoff_delay(self.config.base_delay, self.config.max_delay, attempt);
            attempt += 1;
            self.update(|s| {
                s.mark_failed();
                s.connection_type = ConnectionType::Disconnected;
                s.reconnect_attempts = attempt;
                s.phase = SessionPhase::Reconnecting { attempt };
            });
            debug!(user_id = %self.user_id, ?delay, attempt, "Waiting before reconnect");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PrimaryOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(&mut self, stream: &mut dyn NotificationStream) -> PumpEnd {
        loop {
            let next = tokio::time::timeout(self.config.idle_timeout, stream.next_frame());
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpEnd::Cancelled,
                frame = next => frame,
            };

            match frame {
                Err(_) => return PumpEnd::Failed(TransportError::Timeout(self.config.idle_timeout)),
                Ok(Err(e)) => return PumpEnd::Failed(e),
                Ok(Ok(StreamFrame::Heartbeat)) => {
                    let now = OffsetDateTime::now_utc();
                    self.update(|s| s.last_ping = Some(now));
                }
                Ok(Ok(StreamFrame::Notification(notification))) => {
                    let now = OffsetDateTime::now_utc();
                    self.update(|s| s.last_ping = Some(now));
                    self.deliver(notification);
                }
            }
        }
    }

    async fn run_polling(&mut self) {
        self.update(|s| {
            s.connected = false;
            s.connection_type = ConnectionType::Polling;
            s.reconnect_attempts = 0;
            s.phase = SessionPhase::Connecting {
                transport: ConnectionType::Polling,
            };
        });

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let request = tokio::time::timeout(
                self.config.request_timeout,
                self.poll.poll(&self.user_id, self.cursor),
            );
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = request => result,
            };

            match result {
                Ok(Ok(batch)) => {
                    let now = OffsetDateTime::now_utc();
                    self.update(|s| s.mark_connected(ConnectionType::Polling, now));
                    debug!(
                        user_id = %self.user_id,
                        count = batch.notifications.len(),
                        cursor = batch.next_cursor,
                        "Poll succeeded"
                    );
                    self.cursor = Some(batch.next_cursor);
                    for notification in batch.notifications {
                        self.deliver(notification);
                    }
                }
                Ok(Err(e)) => {
                    warn!(user_id = %self.user_id, error = %e, "Poll failed");
                    self.update(ConnectionStatus::mark_failed);
                }
                Err(_) => {
                    warn!(
                        user_id = %self.user_id,
                        timeout = ?self.config.request_timeout,
                        "Poll timed out"
                    );
                    self.update(ConnectionStatus::mark_failed);
                }
            }
        }
    }

    /// Hand a notification to the consumer unless it was already delivered.
    fn deliver(&mut self, notification: Notification) {
        if !self.seen.insert(&notification.id) {
            debug!(
                user_id = %self.user_id,
                notification_id = %notification.id,
                "Dropping duplicate notification"
            );
            return;
        }
        (self.on_notification)(notification);
    }

    /// Apply `f` to the published status and notify the status callback.
    fn update(&self, f: impl FnOnce(&mut ConnectionStatus)) {
        self.status_tx.send_modify(f);
        let snapshot = self.status_tx.borrow().clone();
        (self.on_status)(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NotificationId {
        NotificationId::derive("u-1", &format!("test:{n}"))
    }

    #[test]
    fn test_recent_ids_rejects_repeats() {
        let mut seen = RecentIds::new(4);
        assert!(seen.insert(&id(1)));
        assert!(!seen.insert(&id(1)));
        assert!(seen.insert(&id(2)));
    }

    #[test]
    fn test_recent_ids_evicts_oldest() {
        let mut seen = RecentIds::new(2);
        assert!(seen.insert(&id(1)));
        assert!(seen.insert(&id(2)));
        assert!(seen.insert(&id(3)));
        // id(1) fell out of the window.
        assert!(seen.insert(&id(1)));
        assert!(!seen.insert(&id(3)));
    }
}
