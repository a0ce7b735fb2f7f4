//! Client-side notification delivery.
//!
//! [`TransportManager`] keeps one logical subscription per user. Each
//! subscription prefers the persistent WebSocket stream, reconnects with
//! exponential backoff when it drops, and falls back to fixed-interval
//! polling once the reconnect budget is spent. Consumers see the same
//! [`Notification`] values whichever transport carried them.
//!
//! Delivery is at-least-once. The manager drops repeats it can still
//! remember, but consumers should treat [`Notification::id`] as the
//! idempotency key.

mod backoff;
mod config;
mod polling;
mod session;
mod status;
mod stream;

pub use backoff::backoff_delay;
pub use config::TransportConfig;
pub use polling::HttpPollTransport;
pub use status::{ConnectionStatus, ConnectionType, SessionPhase};
pub use stream::WsStreamTransport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use compact_str::CompactString;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::objects::{Notification, PollResponse};
use session::Session;

/// Errors raised by a transport. All of them are retryable from the
/// manager's point of view.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("stream closed by server")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(Box::new(err))
    }
}

/// One unit read from a stream connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Notification(Notification),
    /// Liveness signal with no payload (ping/pong).
    Heartbeat,
}

/// The primary, persistent push transport.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Open a stream for `user_id`.
    async fn connect(&self, user_id: &str) -> Result<Box<dyn NotificationStream>, TransportError>;
}

/// An open stream connection.
#[async_trait]
pub trait NotificationStream: Send {
    /// Wait for the next frame. A closed stream is reported as
    /// [`TransportError::Closed`].
    async fn next_frame(&mut self) -> Result<StreamFrame, TransportError>;
}

/// The secondary request/response transport.
#[async_trait]
pub trait PollTransport: Send + Sync + 'static {
    /// Fetch notifications for `user_id` stored after `cursor`, oldest
    /// first. Without a cursor the server returns whatever has not been
    /// delivered yet.
    async fn poll(
        &self,
        user_id: &str,
        cursor: Option<u64>,
    ) -> Result<PollResponse, TransportError>;
}

pub(crate) type NotificationHandler = Arc<dyn Fn(Notification) + Send + Sync>;
pub(crate) type StatusHandler = Arc<dyn Fn(&ConnectionStatus) + Send + Sync>;

struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

/// Owns every active subscription of a client process.
///
/// Construct one explicitly and share it (e.g. behind an `Arc`); there is
/// no global instance.
pub struct TransportManager {
    config: TransportConfig,
    stream: Arc<dyn StreamTransport>,
    poll: Arc<dyn PollTransport>,
    sessions: Mutex<HashMap<CompactString, SessionHandle>>,
}

impl TransportManager {
    /// Create a manager over arbitrary transports.
    pub fn new(
        config: TransportConfig,
        stream: Arc<dyn StreamTransport>,
        poll: Arc<dyn PollTransport>,
    ) -> Self {
        Self {
            config,
            stream,
            poll,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a manager using the WebSocket stream and HTTP polling
    /// endpoints of the server at `base_url`.
    pub fn connect_to(base_url: Url, config: TransportConfig) -> Result<Self, TransportError> {
        let stream = WsStreamTransport::new(base_url.clone());
        let poll = HttpPollTransport::new(base_url, config.request_timeout)?;
        Ok(Self::new(config, Arc::new(stream), Arc::new(poll)))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Start delivering notifications for `user_id`.
    ///
    /// `on_notification` is called once per new notification, in emission
    /// order. `on_status` is called on every connection state change. An
    /// existing subscription for the same user is torn down first.
    ///
    /// Returns a receiver that always holds the latest [`ConnectionStatus`].
    pub async fn subscribe<N, S>(
        &self,
        user_id: impl Into<CompactString>,
        on_notification: N,
        on_status: S,
    ) -> watch::Receiver<ConnectionStatus>
    where
        N: Fn(Notification) + Send + Sync + 'static,
        S: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        let user_id = user_id.into();
        let mut sessions = self.sessions.lock().await;

        if let Some(previous) = sessions.remove(&user_id) {
            info!(user_id = %user_id, "Replacing existing subscription");
            stop_session(previous).await;
        }

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let cancel = CancellationToken::new();
        let session = Session::new(
            user_id.clone(),
            self.config.clone(),
            Arc::clone(&self.stream),
            Arc::clone(&self.poll),
            Arc::new(on_notification),
            Arc::new(on_status),
            status_tx,
            cancel.clone(),
        );
        let task = tokio::spawn(session.run());

        sessions.insert(
            user_id,
            SessionHandle {
                cancel,
                task,
                status_rx: status_rx.clone(),
            },
        );
        status_rx
    }

    /// Stop delivering notifications for `user_id` and release its
    /// connection, timers and poll loop.
    ///
    /// Returns `false` if the user had no subscription.
    pub async fn unsubscribe(&self, user_id: &str) -> bool {
        let handle = self.sessions.lock().await.remove(user_id);
        match handle {
            Some(handle) => {
                stop_session(handle).await;
                true
            }
            None => false,
        }
    }

    /// Latest connection status of `user_id`'s subscription.
    pub async fn status(&self, user_id: &str) -> Option<ConnectionStatus> {
        let sessions = self.sessions.lock().await;
        sessions.get(user_id).map(|h| h.status_rx.borrow().clone())
    }

    /// A receiver tracking `user_id`'s connection status.
    pub async fn watch_status(&self, user_id: &str) -> Option<watch::Receiver<ConnectionStatus>> {
        let sessions = self.sessions.lock().await;
        sessions.get(user_id).map(|h| h.status_rx.clone())
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Tear down every subscription.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.sessions.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            stop_session(handle).await;
        }
    }
}

async fn stop_session(handle: SessionHandle) {
    handle.cancel.cancel();
    if let Err(e) = handle.task.await {
        warn!(error = %e, "Transport session task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{NotificationId, NotificationType, Priority};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use time::OffsetDateTime;
    use tokio::sync::mpsc;

    fn notification(n: u32) -> Notification {
        Notification {
            id: NotificationId::derive("u-1", &format!("test:{n}")),
            kind: NotificationType::OrderStatus,
            user_id: "u-1".into(),
            order_id: None,
            title: format!("n{n}"),
            message: String::new(),
            data: None,
            timestamp: OffsetDateTime::now_utc(),
            priority: Priority::Medium,
        }
    }

    /// Stream transport that refuses every connection.
    struct RefusingStream {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl StreamTransport for RefusingStream {
        async fn connect(&self, _user_id: &str) -> Result<Box<dyn NotificationStream>, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Status(503))
        }
    }

    /// Stream transport whose connections replay frames from a channel.
    struct ChannelStream {
        frames: StdMutex<Option<mpsc::UnboundedReceiver<Result<StreamFrame, TransportError>>>>,
        attempts: AtomicU32,
    }

    struct ChannelConnection {
        rx: mpsc::UnboundedReceiver<Result<StreamFrame, TransportError>>,
    }

    #[async_trait]
    impl NotificationStream for ChannelConnection {
        async fn next_frame(&mut self) -> Result<StreamFrame, TransportError> {
            self.rx.recv().await.unwrap_or(Err(TransportError::Closed))
        }
    }

    #[async_trait]
    impl StreamTransport for ChannelStream {
        async fn connect(&self, _user_id: &str) -> Result<Box<dyn NotificationStream>, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.frames.lock().unwrap().take() {
                Some(rx) => Ok(Box::new(ChannelConnection { rx })),
                None => Err(TransportError::Closed),
            }
        }
    }

    /// Poll transport serving queued batches. Each successful poll moves
    /// the cursor forward by one.
    struct QueuedPoll {
        batches: StdMutex<VecDeque<Result<Vec<Notification>, TransportError>>>,
        calls: AtomicU32,
        cursors: StdMutex<Vec<Option<u64>>>,
        /// The first `slow_calls` polls take `latency` to answer.
        slow_calls: u32,
        latency: Duration,
    }

    impl QueuedPoll {
        fn new(batches: impl IntoIterator<Item = Result<Vec<Notification>, TransportError>>) -> Self {
            Self {
                batches: StdMutex::new(batches.into_iter().collect()),
                calls: AtomicU32::new(0),
                cursors: StdMutex::new(Vec::new()),
                slow_calls: 0,
                latency: Duration::ZERO,
            }
        }

        fn with_latency(mut self, slow_calls: u32, latency: Duration) -> Self {
            self.slow_calls = slow_calls;
            self.latency = latency;
            self
        }
    }

    #[async_trait]
    impl PollTransport for QueuedPoll {
        async fn poll(
            &self,
            _user_id: &str,
            cursor: Option<u64>,
        ) -> Result<PollResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().unwrap().push(cursor);
            if call < self.slow_calls {
                tokio::time::sleep(self.latency).await;
            }
            let batch = self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            batch.map(|notifications| PollResponse {
                notifications,
                next_cursor: cursor.unwrap_or(0) + 1,
            })
        }
    }

    fn quick_config() -> TransportConfig {
        TransportConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            max_reconnect_attempts: 3,
            poll_interval: Duration::from_secs(3),
            ..TransportConfig::default()
        }
    }

    fn collector() -> (Arc<StdMutex<Vec<Notification>>>, impl Fn(Notification) + Send + Sync + 'static) {
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        (received, move |n| sink.lock().unwrap().push(n))
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_polling_after_max_attempts() {
        let stream = Arc::new(RefusingStream {
            attempts: AtomicU32::new(0),
        });
        let first = notification(1);
        let second = notification(2);
        let poll = Arc::new(QueuedPoll::new([
            Ok(vec![first.clone()]),
            Ok(vec![first.clone(), second.clone()]),
        ]));
        let manager = TransportManager::new(quick_config(), stream.clone(), poll.clone());

        let (received, on_notification) = collector();
        let status_rx = manager.subscribe("u-1", on_notification, |_| {}).await;

        // 100 + 200 + 400 ms of backoff, then two poll ticks 3 s apart.
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(stream.attempts.load(Ordering::SeqCst), 4);
        let status = status_rx.borrow().clone();
        assert_eq!(status.connection_type, ConnectionType::Polling);
        assert!(status.connected);
        assert_eq!(status.reconnect_attempts, 0);

        // The overlapping second batch is de-duplicated, order is preserved.
        let titles: Vec<String> = received.lock().unwrap().iter().map(|n| n.title.clone()).collect();
        assert_eq!(titles, vec!["n1".to_string(), "n2".to_string()]);

        // The first poll asks for anything undelivered, later ones resume
        // from the cursor the server handed back.
        assert_eq!(*poll.cursors.lock().unwrap(), vec![None, Some(1)]);

        // Fallback is sticky: no more stream attempts while polling.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(stream.attempts.load(Ordering::SeqCst), 4);

        assert!(manager.unsubscribe("u-1").await);
        assert_eq!(status_rx.borrow().connection_type, ConnectionType::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_reset_after_successful_connection() {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let stream = Arc::new(ChannelStream {
            frames: StdMutex::new(Some(frame_rx)),
            attempts: AtomicU32::new(0),
        });
        let poll = Arc::new(QueuedPoll::new([]));
        let manager = TransportManager::new(quick_config(), stream.clone(), poll.clone());

        let statuses = Arc::new(StdMutex::new(Vec::<ConnectionStatus>::new()));
        let status_sink = Arc::clone(&statuses);
        let (received, on_notification) = collector();
        let status_rx = manager
            .subscribe("u-1", on_notification, move |s| {
                status_sink.lock().unwrap().push(s.clone())
            })
            .await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let status = status_rx.borrow();
            assert!(status.connected);
            assert_eq!(status.connection_type, ConnectionType::Stream);
            assert_eq!(status.reconnect_attempts, 0);
        }

        frame_tx.send(Ok(StreamFrame::Notification(notification(1)))).unwrap();
        frame_tx.send(Ok(StreamFrame::Notification(notification(1)))).unwrap();
        frame_tx.send(Ok(StreamFrame::Heartbeat)).unwrap();
        frame_tx.send(Ok(StreamFrame::Notification(notification(2)))).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(received.lock().unwrap().len(), 2);

        // Drop the stream; the session backs off and retries.
        drop(frame_tx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(status_rx.borrow().reconnect_attempts, 1);
        assert!(!status_rx.borrow().connected);

        // The first connection succeeded, so the attempt counter started
        // from zero and the first delay is the base delay.
        let reconnecting: Vec<u32> = statuses
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s.phase {
                SessionPhase::Reconnecting { attempt } => Some(attempt),
                _ => None,
            })
            .collect();
        assert_eq!(reconnecting, vec![1]);

        manager.shutdown().await;
        assert_eq!(manager.subscription_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_marks_disconnected_without_leaving_polling() {
        let stream = Arc::new(RefusingStream {
            attempts: AtomicU32::new(0),
        });
        let poll = Arc::new(QueuedPoll::new([
            Ok(Vec::new()),
            Err(TransportError::Status(500)),
            Err(TransportError::Status(500)),
            Ok(vec![notification(7)]),
        ]));
        let config = TransportConfig {
            max_reconnect_attempts: 0,
            ..quick_config()
        };
        let manager = TransportManager::new(config, stream, poll.clone());
        let (received, on_notification) = collector();
        let status_rx = manager.subscribe("u-1", on_notification, |_| {}).await;

        // First tick fires immediately, then every 3 s.
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        {
            let status = status_rx.borrow();
            assert!(!status.connected);
            assert_eq!(status.connection_type, ConnectionType::Polling);
            assert_eq!(status.consecutive_failures, 1);
        }

        tokio::time::sleep(Duration::from_secs(6)).await;
        let status = status_rx.borrow().clone();
        assert!(status.connected);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(poll.calls.load(Ordering::SeqCst), 4);
        assert_eq!(received.lock().unwrap().len(), 1);
        // Failed polls do not move the cursor.
        assert_eq!(
            *poll.cursors.lock().unwrap(),
            vec![None, Some(1), Some(1), Some(1)]
        );

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_poll_skips_missed_ticks() {
        let stream = Arc::new(RefusingStream {
            attempts: AtomicU32::new(0),
        });
        // The first poll takes 7 s, so the ticks due at 3 s and 6 s are
        // missed while it is outstanding.
        let poll = Arc::new(QueuedPoll::new([]).with_latency(1, Duration::from_secs(7)));
        let config = TransportConfig {
            max_reconnect_attempts: 0,
            ..quick_config()
        };
        let manager = TransportManager::new(config, stream, poll.clone());
        let _status_rx = manager.subscribe("u-1", |_| {}, |_| {}).await;

        // One late tick right after the slow poll, no burst of catch-up
        // ticks, and never two polls in flight.
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(poll.calls.load(Ordering::SeqCst), 2);

        // Back on the 3 s grid: next tick at 9 s.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(poll.calls.load(Ordering::SeqCst), 3);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_replaces_session() {
        let stream = Arc::new(RefusingStream {
            attempts: AtomicU32::new(0),
        });
        let poll = Arc::new(QueuedPoll::new([]));
        let manager = TransportManager::new(quick_config(), stream, poll);

        let first = manager.subscribe("u-1", |_| {}, |_| {}).await;
        let _second = manager.subscribe("u-1", |_| {}, |_| {}).await;
        assert_eq!(manager.subscription_count().await, 1);
        assert_eq!(first.borrow().connection_type, ConnectionType::Disconnected);

        assert!(manager.unsubscribe("u-1").await);
        assert!(!manager.unsubscribe("u-1").await);
        assert!(manager.status("u-1").await.is_none());
    }
}
