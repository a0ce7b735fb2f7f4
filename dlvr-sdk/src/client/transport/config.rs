//! Tunables for reconnection, fallback and polling.

use std::time::Duration;

/// Configuration for a [`TransportManager`](super::TransportManager).
///
/// Every threshold is a plain value so deployments can tune fallback
/// behavior without code changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Upper bound for any reconnect delay.
    pub max_delay: Duration,
    /// Reconnect attempts on the stream before falling back to polling.
    pub max_reconnect_attempts: u32,
    /// Interval between polling requests once on the fallback transport.
    pub poll_interval: Duration,
    /// Deadline for establishing the stream connection.
    pub connect_timeout: Duration,
    /// Deadline for a single polling request.
    pub request_timeout: Duration,
    /// A stream silent for longer than this is treated as dead. The server
    /// pings every 30 seconds.
    pub idle_timeout: Duration,
    /// Number of recent notification ids remembered for de-duplication.
    pub dedupe_window: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            poll_interval: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(75),
            dedupe_window: 256,
        }
    }
}
