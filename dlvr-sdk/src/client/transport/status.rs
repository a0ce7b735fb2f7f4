//! Observable connection state of one subscription.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Which transport currently carries notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Stream,
    Polling,
    #[default]
    Disconnected,
}

/// Where the session is in its connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Connecting { transport: ConnectionType },
    Connected { transport: ConnectionType },
    /// Waiting out a backoff delay before stream attempt `attempt`.
    Reconnecting { attempt: u32 },
}

/// Snapshot of a subscription's connectivity, for "live" indicators.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connection_type: ConnectionType,
    /// Last time any frame or poll response arrived.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_ping: Option<OffsetDateTime>,
    /// Stream reconnect attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Failed attempts on any transport since the last success.
    pub consecutive_failures: u32,
    pub phase: SessionPhase,
}

impl ConnectionStatus {
    pub(super) fn mark_connected(&mut self, transport: ConnectionType, at: OffsetDateTime) {
        self.connected = true;
        self.connection_type = transport;
        self.last_ping = Some(at);
        self.reconnect_attempts = 0;
        self.consecutive_failures = 0;
        self.phase = SessionPhase::Connected { transport };
    }

    pub(super) fn mark_failed(&mut self) {
        self.connected = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub(super) fn mark_disconnected(&mut self) {
        self.connected = false;
        self.connection_type = ConnectionType::Disconnected;
        self.phase = SessionPhase::Disconnected;
    }
}
