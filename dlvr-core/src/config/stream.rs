use std::time::Duration;

/// Server side of the notification transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Interval between heartbeat pings on an open stream.
    pub heartbeat_interval: Duration,
    /// A user counts as looking at the app for this long after a poll.
    pub presence_window: Duration,
    /// Upper bound on notifications returned by one poll or catch-up.
    pub page_limit: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            presence_window: Duration::from_secs(10),
            page_limit: 100,
        }
    }
}
