//! Event processors for the delivery engine.
//!
//! - `LifecycleScheduler`: Drives order plans, emits `DomainEvent::Status`
//! - `NotificationFanout`: Receives `DomainEvent`, stores and publishes
//!   `Notification`, emits `AlertRequest`
//! - `AlertSender`: Receives `AlertRequest`, posts to the push gateway

pub mod alert_sender;
pub mod lifecycle_scheduler;
pub mod notification_fanout;

pub use alert_sender::{AlertError, AlertSender};
pub use lifecycle_scheduler::{LifecycleScheduler, SchedulerError};
pub use notification_fanout::{
    FanoutError, FanoutOutcome, NotificationFanout, build_notification, classify,
};
