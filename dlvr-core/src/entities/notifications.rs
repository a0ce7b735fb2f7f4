//! Notification persistence.
//!
//! Every notification the fanout creates is stored before it is published,
//! so polling clients and reconnecting streams can catch up on anything
//! they missed. Records are addressed by their deterministic id; storing the
//! same id twice is a no-op that reports whether the first copy already
//! reached the user.
//!
//! Each record also gets a cursor when it is stored. Cursors grow with
//! storage order and are what polling clients page by; timestamps are for
//! display only, since producers may stamp events slightly out of order.

use std::collections::HashMap;

use async_trait::async_trait;
use compact_str::CompactString;
use dlvr_sdk::objects::{Notification, NotificationId, UnknownVariant};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Errors raised by a [`NotificationStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a notification.
    #[error("corrupt notification record {id}: {reason}")]
    Corrupt { id: String, reason: UnknownVariant },
}

/// A stored notification and its per-user flags.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNotification {
    /// Storage position, unique and increasing across the store.
    pub cursor: u64,
    pub notification: Notification,
    pub read: bool,
    /// Set once the notification was handed to a stream or polling client.
    pub delivered: bool,
}

/// Result of [`NotificationStore::insert_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Existing { delivered: bool },
}

#[async_trait]
pub trait NotificationStore: Send + Sync + 'static {
    /// Store `notification` unless a record with the same id exists.
    async fn insert_if_absent(&self, notification: &Notification)
    -> Result<InsertOutcome, StoreError>;

    /// Notifications for `user_id` stored after `cursor`, in storage order,
    /// at most `limit` of them.
    async fn list_after(
        &self,
        user_id: &str,
        cursor: u64,
        limit: usize,
    ) -> Result<Vec<StoredNotification>, StoreError>;

    /// The oldest `limit` notifications for `user_id` not yet delivered, in
    /// storage order.
    async fn list_undelivered(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredNotification>, StoreError>;

    /// Cursor of the newest notification stored for `user_id`, or 0.
    async fn latest_cursor(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Flag notifications as delivered. Returns the number of records that
    /// changed.
    async fn mark_delivered(&self, ids: &[NotificationId]) -> Result<u64, StoreError>;

    /// Flag one of `user_id`'s notifications as read. Returns `false` when
    /// the user has no such notification.
    async fn mark_read(&self, user_id: &str, id: &NotificationId) -> Result<bool, StoreError>;

    /// Remove every notification addressed to `user_id`.
    async fn clear(&self, user_id: &str) -> Result<u64, StoreError>;
}

/// Round a timestamp down to the microsecond precision every store keeps.
pub fn storage_timestamp(at: OffsetDateTime) -> OffsetDateTime {
    let micros = at.microsecond();
    at.replace_microsecond(micros).unwrap_or(at)
}

#[derive(Default)]
struct MemoryState {
    /// Per-user records in cursor order.
    by_user: HashMap<CompactString, Vec<StoredNotification>>,
    owners: HashMap<NotificationId, CompactString>,
    last_cursor: u64,
}

/// Process-local store used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryNotificationStore {
    state: RwLock<MemoryState>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored notifications across all users.
    pub async fn len(&self) -> usize {
        self.state.read().await.owners.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert_if_absent(
        &self,
        notification: &Notification,
    ) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.write().await;

        if let Some(owner) = state.owners.get(&notification.id) {
            let delivered = state
                .by_user
                .get(owner)
                .and_then(|records| {
                    records
                        .iter()
                        .find(|r| r.notification.id == notification.id)
                })
                .is_some_and(|r| r.delivered);
            return Ok(InsertOutcome::Existing { delivered });
        }

        let mut stored = notification.clone();
        stored.timestamp = storage_timestamp(stored.timestamp);
        state.last_cursor += 1;
        let cursor = state.last_cursor;
        state
            .owners
            .insert(stored.id.clone(), stored.user_id.clone());
        state
            .by_user
            .entry(stored.user_id.clone())
            .or_default()
            .push(StoredNotification {
                cursor,
                notification: stored,
                read: false,
                delivered: false,
            });
        Ok(InsertOutcome::Inserted)
    }

    async fn list_after(
        &self,
        user_id: &str,
        cursor: u64,
        limit: usize,
    ) -> Result<Vec<StoredNotification>, StoreError> {
        let state = self.state.read().await;
        let Some(records) = state.by_user.get(user_id) else {
            return Ok(Vec::new());
        };
        let start = records.partition_point(|r| r.cursor <= cursor);
        Ok(records[start..].iter().take(limit).cloned().collect())
    }

    async fn list_undelivered(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredNotification>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .by_user
            .get(user_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| !r.delivered)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_cursor(&self, user_id: &str) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .by_user
            .get(user_id)
            .and_then(|records| records.last())
            .map_or(0, |r| r.cursor))
    }

    async fn mark_delivered(&self, ids: &[NotificationId]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let MemoryState {
            by_user, owners, ..
        } = &mut *state;
        let mut changed = 0;
        for id in ids {
            let Some(records) = owners.get(id).and_then(|owner| by_user.get_mut(owner)) else {
                continue;
            };
            if let Some(record) = records
                .iter_mut()
                .find(|r| &r.notification.id == id && !r.delivered)
            {
                record.delivered = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn mark_read(&self, user_id: &str, id: &NotificationId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(record) = state
            .by_user
            .get_mut(user_id)
            .and_then(|records| records.iter_mut().find(|r| &r.notification.id == id))
        else {
            return Ok(false);
        };
        record.read = true;
        Ok(true)
    }

    async fn clear(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let Some(records) = state.by_user.remove(user_id) else {
            return Ok(0);
        };
        for record in &records {
            state.owners.remove(&record.notification.id);
        }
        Ok(records.len() as u64)
    }
}
