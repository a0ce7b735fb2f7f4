//! The notification record pushed to clients over every transport.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::status::LifecycleStatus;

/// Identifier of a [`Notification`], used by consumers to de-duplicate.
///
/// Ids are derived from the addressee and a scope key rather than generated
/// at random, so redelivering the same domain event always yields the same
/// id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub CompactString);

impl NotificationId {
    const PREFIX: &'static str = "ntf_";

    /// Derive the id for `scope` addressed to `user_id`.
    ///
    /// The id is `ntf_` followed by the Crockford base32 encoding of the
    /// first 16 bytes of `SHA-256("{user_id}\n{scope}")`.
    pub fn derive(user_id: &str, scope: &str) -> Self {
        let data = format!("{user_id}\n{scope}");
        let digest = ring::digest::digest(&ring::digest::SHA256, data.as_bytes());
        let encoded = fast32::base32::CROCKFORD.encode(&digest.as_ref()[..16]);
        let mut id = CompactString::new(Self::PREFIX);
        id.push_str(&encoded);
        Self(id)
    }

    /// Id of the notification produced when simulation run `run_id` of
    /// `order_id` reaches `status`.
    pub fn for_status(user_id: &str, order_id: Uuid, run_id: Uuid, status: LifecycleStatus) -> Self {
        Self::derive(user_id, &format!("order:{order_id}:{run_id}:{status}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderStatus,
    PaymentUpdate,
    DeliveryUpdate,
    SystemNotification,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::OrderStatus => "order_status",
            NotificationType::PaymentUpdate => "payment_update",
            NotificationType::DeliveryUpdate => "delivery_update",
            NotificationType::SystemNotification => "system_notification",
        }
    }
}

/// Delivery priority. Ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Whether notifications of this priority warrant an out-of-band alert
    /// when the user is not looking at the app.
    pub fn escalates(self) -> bool {
        match self {
            Priority::Low | Priority::Medium => false,
            Priority::High | Priority::Urgent => true,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(UnknownVariant(other.to_owned())),
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_status" => Ok(NotificationType::OrderStatus),
            "payment_update" => Ok(NotificationType::PaymentUpdate),
            "delivery_update" => Ok(NotificationType::DeliveryUpdate),
            "system_notification" => Ok(NotificationType::SystemNotification),
            other => Err(UnknownVariant(other.to_owned())),
        }
    }
}

/// A stored string did not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// An addressed, user-facing notification.
///
/// This is the exact JSON shape sent as one stream frame and returned in
/// polling responses:
///
/// ```json
/// {"id":"ntf_...","type":"order_status","userId":"u-1","orderId":"...",
///  "title":"Preparing your food","message":"...","data":{...},
///  "timestamp":"2026-01-01T12:00:00Z","priority":"medium"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub user_id: CompactString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub priority: Priority,
}

/// Body returned by the polling endpoint.
///
/// `next_cursor` is assigned by the server and only ever moves forward.
/// Pass it back as `?after=` on the next poll to receive everything stored
/// since this response, regardless of client clock or event timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub next_cursor: u64,
}

/// Body of `POST /api/v1/users/{user_id}/notifications`: a payment,
/// delivery or system signal to be turned into a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSignalRequest {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Identifies the underlying fact. Publishing the same key twice yields
    /// one notification.
    pub dedupe_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub urgent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_notification_id_is_deterministic() {
        let order_id = Uuid::nil();
        let run = Uuid::from_u128(1);
        let a = NotificationId::for_status("u-1", order_id, run, LifecycleStatus::Preparing);
        let b = NotificationId::for_status("u-1", order_id, run, LifecycleStatus::Preparing);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("ntf_"));

        let other_status =
            NotificationId::for_status("u-1", order_id, run, LifecycleStatus::Delivered);
        let other_user = NotificationId::for_status("u-2", order_id, run, LifecycleStatus::Preparing);
        let other_run = NotificationId::for_status(
            "u-1",
            order_id,
            Uuid::from_u128(2),
            LifecycleStatus::Preparing,
        );
        assert_ne!(a, other_status);
        assert_ne!(a, other_user);
        assert_ne!(a, other_run);
    }

    #[test]
    fn test_notification_wire_shape() {
        let notification = Notification {
            id: NotificationId::derive("u-1", "system:welcome"),
            kind: NotificationType::SystemNotification,
            user_id: "u-1".into(),
            order_id: None,
            title: "Welcome".to_string(),
            message: "Hello".to_string(),
            data: None,
            timestamp: datetime!(2026-01-01 12:00:00 UTC),
            priority: Priority::Low,
        };

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "system_notification");
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["priority"], "low");
        assert_eq!(value["timestamp"], "2026-01-01T12:00:00Z");
        assert!(value.get("orderId").is_none());
        assert!(value.get("data").is_none());

        let parsed: Notification = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, notification);
    }

    #[test]
    fn test_priority_escalation_and_order() {
        assert!(!Priority::Low.escalates());
        assert!(!Priority::Medium.escalates());
        assert!(Priority::High.escalates());
        assert!(Priority::Urgent.escalates());
        assert!(Priority::Urgent > Priority::High);
        assert_eq!("urgent".parse::<Priority>(), Ok(Priority::Urgent));
        assert!("loud".parse::<Priority>().is_err());
    }
}
