//! Event type definitions.
//!
//! Unlike notifications, events are not persisted. A producer that retries
//! after a crash may emit the same event twice; the fanout derives
//! notification ids deterministically so the retry is harmless.

use compact_str::CompactString;
use dlvr_sdk::objects::{LifecycleStatus, NotificationId, Priority};
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Courier details attached to `driver_assigned` and `out_for_delivery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierDetails {
    pub name: String,
    pub phone: String,
    pub vehicle: String,
}

/// Status-specific payload carried by a [`StatusEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusPayload {
    None,
    #[serde(rename_all = "camelCase")]
    Confirmation {
        cook_minutes: u32,
        total_amount: Decimal,
        item_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    Kitchen { chef: String, queue_depth: usize },
    Courier(CourierDetails),
    #[serde(rename_all = "camelCase")]
    Refund { refund_notice: String },
}

/// An order reached a lifecycle status. Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub order_id: Uuid,
    /// Simulation run the event belongs to; restarting an order starts a
    /// new run.
    pub run_id: Uuid,
    /// Owner of the order; every notification for it is addressed here.
    pub user_id: CompactString,
    pub status: LifecycleStatus,
    pub emitted_at: OffsetDateTime,
    /// Minutes until the planned delivery, when still meaningful.
    pub eta_minutes: Option<u32>,
    pub message: String,
    pub payload: StatusPayload,
}

/// A non-lifecycle trigger for a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSignal {
    pub user_id: CompactString,
    pub order_id: Option<Uuid>,
    /// Identifies the underlying fact; the same key always maps to the same
    /// notification id.
    pub dedupe_key: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub occurred_at: OffsetDateTime,
    /// Explicitly flagged as urgent by the producer.
    pub urgent: bool,
}

/// Everything the fanout turns into notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Status(StatusEvent),
    PaymentUpdate(DomainSignal),
    DeliveryUpdate(DomainSignal),
    System(DomainSignal),
}

impl DomainEvent {
    pub fn user_id(&self) -> &str {
        match self {
            DomainEvent::Status(e) => &e.user_id,
            DomainEvent::PaymentUpdate(s) | DomainEvent::DeliveryUpdate(s) | DomainEvent::System(s) => {
                &s.user_id
            }
        }
    }
}

/// Request for an out-of-band alert through the platform notification
/// facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub user_id: CompactString,
    pub notification_id: NotificationId,
    pub title: String,
    pub body: String,
    /// Alerts sharing a tag replace each other on the device.
    pub tag: String,
    pub urgency: Priority,
}
