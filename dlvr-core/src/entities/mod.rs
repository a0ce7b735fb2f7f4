pub mod lifecycle_plan;
pub mod notification_records;
pub mod notifications;

pub use lifecycle_plan::{OrderLifecyclePlan, PlanInputs, PlannedTransition};
pub use notification_records::PgNotificationStore;
pub use notifications::{
    InsertOutcome, MemoryNotificationStore, NotificationStore, StoreError, StoredNotification,
};
