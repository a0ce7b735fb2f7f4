//! Event channel factories and handles.

use dlvr_sdk::objects::Notification;
use tokio::sync::{broadcast, mpsc};

use super::types::{AlertRequest, DomainEvent};

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Notifications a slow stream subscriber may fall behind by before it has
/// to catch up from the store.
pub const NOTIFICATION_BUS_CAPACITY: usize = 1024;

/// Sender handle for DomainEvent events.
pub type DomainEventSender = mpsc::Sender<DomainEvent>;
/// Receiver handle for DomainEvent events.
pub type DomainEventReceiver = mpsc::Receiver<DomainEvent>;

/// Sender handle for AlertRequest events.
pub type AlertRequestSender = mpsc::Sender<AlertRequest>;
/// Receiver handle for AlertRequest events.
pub type AlertRequestReceiver = mpsc::Receiver<AlertRequest>;

/// Outbound path for stored notifications.
///
/// Every open stream connection holds a receiver and forwards the
/// notifications addressed to its user, in publication order.
pub type NotificationBus = broadcast::Sender<Notification>;

/// Create a new DomainEvent channel.
pub fn domain_event_channel() -> (DomainEventSender, DomainEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new AlertRequest channel.
pub fn alert_channel() -> (AlertRequestSender, AlertRequestReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the notification bus. Receivers are created with
/// [`broadcast::Sender::subscribe`].
pub fn notification_bus() -> NotificationBus {
    let (tx, _) = broadcast::channel(NOTIFICATION_BUS_CAPACITY);
    tx
}
