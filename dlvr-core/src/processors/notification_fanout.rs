//! NotificationFanout processor.
//!
//! The NotificationFanout is responsible for:
//! - Receiving `DomainEvent` from the queue
//! - Classifying each event into a notification type and priority
//! - Storing the notification under its deterministic id
//! - Publishing new notifications on the `NotificationBus`
//! - Emitting `AlertRequest` for high-priority notifications when the user
//!   is not in the foreground
//!
//! Storing the same event twice yields the same id. A duplicate is
//! published again only if the first copy never reached the user.

use std::sync::Arc;

use dlvr_sdk::objects::{
    LifecycleStatus, Notification, NotificationId, NotificationType, Priority,
};
use kanau::processor::Processor;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::entities::notifications::{
    InsertOutcome, NotificationStore, StoreError, storage_timestamp,
};
use crate::events::{
    AlertRequest, AlertRequestSender, DomainEvent, DomainEventReceiver, DomainSignal,
    NotificationBus, StatusEvent,
};
use crate::presence::PresenceRegistry;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("notification store error: {0}")]
    Store(#[from] StoreError),
}

/// What happened to one domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// Stored and published for the first time.
    Published(NotificationId),
    /// Already stored but never delivered; published again.
    Republished(NotificationId),
    /// Already stored and delivered; dropped.
    Duplicate(NotificationId),
}

/// NotificationFanout turns domain events into stored, published
/// notifications.
#[derive(Clone)]
pub struct NotificationFanout {
    store: Arc<dyn NotificationStore>,
    bus: NotificationBus,
    alert_tx: AlertRequestSender,
    presence: PresenceRegistry,
}

impl NotificationFanout {
    /// Create a new NotificationFanout.
    ///
    /// # Arguments
    ///
    /// * `store` - Notification persistence
    /// * `bus` - Broadcast channel every stream connection listens on
    /// * `alert_tx` - Sender for AlertRequest events
    /// * `presence` - Foreground tracking used to decide on escalation
    pub fn new(
        store: Arc<dyn NotificationStore>,
        bus: NotificationBus,
        alert_tx: AlertRequestSender,
        presence: PresenceRegistry,
    ) -> Self {
        Self {
            store,
            bus,
            alert_tx,
            presence,
        }
    }

    /// Run the NotificationFanout until shutdown or until every producer
    /// is gone.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut event_rx: DomainEventReceiver,
    ) {
        info!("NotificationFanout started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("NotificationFanout received shutdown signal");
                        break;
                    }
                }

                Some(event) = event_rx.recv() => {
                    debug!(user_id = %event.user_id(), "Received DomainEvent");

                    if let Err(e) = self.process(event).await {
                        error!(error = %e, "Failed to process DomainEvent");
                    }
                }

                else => {
                    info!("DomainEvent channel closed");
                    break;
                }
            }
        }

        info!("NotificationFanout shutdown complete");
    }

    fn publish(&self, notification: Notification) {
        let id = notification.id.clone();
        if self.bus.send(notification).is_err() {
            debug!(notification_id = %id, "No stream subscribers for notification");
        }
    }

    fn escalate(&self, notification: &Notification) {
        if !notification.priority.escalates() || self.presence.is_foreground(&notification.user_id)
        {
            return;
        }

        let request = AlertRequest {
            user_id: notification.user_id.clone(),
            notification_id: notification.id.clone(),
            title: notification.title.clone(),
            body: notification.message.clone(),
            tag: alert_tag(notification),
            urgency: notification.priority,
        };
        match self.alert_tx.try_send(request) {
            Ok(()) => {
                debug!(notification_id = %notification.id, "Alert requested");
            }
            Err(TrySendError::Full(request)) => {
                warn!(notification_id = %request.notification_id, "Alert queue full, dropping alert");
            }
            Err(TrySendError::Closed(request)) => {
                warn!(notification_id = %request.notification_id, "Alert sender gone, dropping alert");
            }
        }
    }
}

impl Processor<DomainEvent> for NotificationFanout {
    type Output = FanoutOutcome;
    type Error = FanoutError;

    async fn process(&self, event: DomainEvent) -> Result<FanoutOutcome, FanoutError> {
        let notification = build_notification(&event);
        let id = notification.id.clone();

        match self.store.insert_if_absent(&notification).await? {
            InsertOutcome::Inserted => {
                info!(
                    notification_id = %id,
                    user_id = %notification.user_id,
                    kind = notification.kind.as_str(),
                    priority = notification.priority.as_str(),
                    "Notification created"
                );
                self.escalate(&notification);
                self.publish(notification);
                Ok(FanoutOutcome::Published(id))
            }
            InsertOutcome::Existing { delivered: false } => {
                debug!(notification_id = %id, "Republishing undelivered notification");
                self.publish(notification);
                Ok(FanoutOutcome::Republished(id))
            }
            InsertOutcome::Existing { delivered: true } => {
                debug!(notification_id = %id, "Dropping already delivered notification");
                Ok(FanoutOutcome::Duplicate(id))
            }
        }
    }
}

/// Priority of the notification produced for `event`.
pub fn classify(event: &DomainEvent) -> Priority {
    match event {
        DomainEvent::Status(e) => match e.status {
            LifecycleStatus::OrderConfirmed
            | LifecycleStatus::Preparing
            | LifecycleStatus::ReadyForPickup
            | LifecycleStatus::DriverAssigned
            | LifecycleStatus::OutForDelivery => Priority::Medium,
            LifecycleStatus::Delivered | LifecycleStatus::Cancelled => Priority::High,
        },
        DomainEvent::PaymentUpdate(s) | DomainEvent::DeliveryUpdate(s) => {
            if s.urgent {
                Priority::Urgent
            } else {
                Priority::Medium
            }
        }
        DomainEvent::System(s) => {
            if s.urgent {
                Priority::Urgent
            } else {
                Priority::Low
            }
        }
    }
}

/// Build the notification for `event`.
///
/// The result depends only on the event, so redelivering an event
/// reproduces the stored notification exactly.
pub fn build_notification(event: &DomainEvent) -> Notification {
    let priority = classify(event);
    match event {
        DomainEvent::Status(e) => status_notification(e, priority),
        DomainEvent::PaymentUpdate(s) => {
            signal_notification(s, NotificationType::PaymentUpdate, "payment", priority)
        }
        DomainEvent::DeliveryUpdate(s) => {
            signal_notification(s, NotificationType::DeliveryUpdate, "delivery", priority)
        }
        DomainEvent::System(s) => {
            signal_notification(s, NotificationType::SystemNotification, "system", priority)
        }
    }
}

fn status_notification(event: &StatusEvent, priority: Priority) -> Notification {
    let details = serde_json::to_value(&event.payload).unwrap_or_default();
    Notification {
        id: NotificationId::for_status(&event.user_id, event.order_id, event.run_id, event.status),
        kind: NotificationType::OrderStatus,
        user_id: event.user_id.clone(),
        order_id: Some(event.order_id),
        title: event.status.title().to_string(),
        message: event.message.clone(),
        data: Some(json!({
            "status": event.status,
            "icon": event.status.icon(),
            "estimatedMinutes": event.eta_minutes,
            "details": details,
        })),
        timestamp: storage_timestamp(event.emitted_at),
        priority,
    }
}

fn signal_notification(
    signal: &DomainSignal,
    kind: NotificationType,
    scope: &str,
    priority: Priority,
) -> Notification {
    Notification {
        id: NotificationId::derive(&signal.user_id, &format!("{scope}:{}", signal.dedupe_key)),
        kind,
        user_id: signal.user_id.clone(),
        order_id: signal.order_id,
        title: signal.title.clone(),
        message: signal.message.clone(),
        data: signal.data.clone(),
        timestamp: storage_timestamp(signal.occurred_at),
        priority,
    }
}

fn alert_tag(notification: &Notification) -> String {
    match notification.order_id {
        Some(order_id) => format!("order-{order_id}"),
        None => notification.id.to_string(),
    }
}
