//! Application state shared across all request handlers.

use dlvr_core::config::{AlertConfig, ConfigStore, StreamConfig};
use dlvr_core::entities::NotificationStore;
use dlvr_core::events::{DomainEventSender, NotificationBus};
use dlvr_core::presence::PresenceRegistry;
use dlvr_core::processors::LifecycleScheduler;
use std::sync::Arc;
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub scheduler: LifecycleScheduler,
    pub store: Arc<dyn NotificationStore>,
    /// Every stored notification is published here; stream connections
    /// filter it by user.
    pub bus: NotificationBus,
    /// Entry point for payment, delivery and system signals.
    pub events: DomainEventSender,
    pub presence: PresenceRegistry,
    pub stream: StreamConfig,
    /// Alert settings (can be reloaded via SIGHUP).
    pub alerts: ConfigStore<AlertConfig>,
    /// Flips to `true` when the server starts shutting down.
    pub shutdown_rx: watch::Receiver<bool>,
}
