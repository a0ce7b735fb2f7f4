//! Event types and channels connecting the processors.
//!
//! # Event Flow
//!
//! 1. `LifecycleScheduler` emits `DomainEvent::Status` -> `NotificationFanout`
//! 2. Other components emit payment, delivery and system signals -> `NotificationFanout`
//! 3. `NotificationFanout` stores a `Notification` and publishes it on the
//!    `NotificationBus`, which every stream connection subscribes to
//! 4. `NotificationFanout` emits `AlertRequest` -> `AlertSender` for
//!    high-priority notifications the user is not looking at

pub mod channels;
pub mod types;

pub use channels::{
    AlertRequestReceiver, AlertRequestSender, DEFAULT_CHANNEL_BUFFER, DomainEventReceiver,
    DomainEventSender, NOTIFICATION_BUS_CAPACITY, NotificationBus, alert_channel,
    domain_event_channel, notification_bus,
};
pub use types::{AlertRequest, CourierDetails, DomainEvent, DomainSignal, StatusEvent, StatusPayload};
