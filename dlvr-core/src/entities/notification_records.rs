use async_trait::async_trait;
use dlvr_sdk::objects::{Notification, NotificationId};
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::notifications::{
    InsertOutcome, NotificationStore, StoreError, StoredNotification, storage_timestamp,
};
use crate::framework::DatabaseProcessor;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct NotificationRecord {
    pub seq: i64,
    pub id: String,
    pub user_id: String,
    pub order_id: Option<Uuid>,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub priority: String,
    pub created_at: OffsetDateTime,
    pub read: bool,
    pub delivered: bool,
}

impl TryFrom<NotificationRecord> for StoredNotification {
    type Error = StoreError;

    fn try_from(record: NotificationRecord) -> Result<Self, Self::Error> {
        let corrupt = |reason| StoreError::Corrupt {
            id: record.id.clone(),
            reason,
        };
        let kind = record.kind.parse().map_err(corrupt)?;
        let priority = record.priority.parse().map_err(corrupt)?;
        Ok(StoredNotification {
            // BIGSERIAL starts at 1.
            cursor: record.seq.unsigned_abs(),
            notification: Notification {
                id: NotificationId(record.id.as_str().into()),
                kind,
                user_id: record.user_id.as_str().into(),
                order_id: record.order_id,
                title: record.title,
                message: record.message,
                data: record.data,
                timestamp: record.created_at,
                priority,
            },
            read: record.read,
            delivered: record.delivered,
        })
    }
}

#[derive(Debug, Clone)]
/// Insert a notification, ignoring it if the id is already stored.
///
/// Returns `true` if a row was inserted.
pub struct InsertNotification {
    pub notification: Notification,
}

impl Processor<InsertNotification> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertNotification")]
    async fn process(&self, insert: InsertNotification) -> Result<bool, sqlx::Error> {
        let n = insert.notification;
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO notifications
                (id, user_id, order_id, kind, title, message, data, priority, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            RETURNING seq
            "#,
        )
        .bind(n.id.as_str())
        .bind(n.user_id.as_str())
        .bind(n.order_id)
        .bind(n.kind.as_str())
        .bind(&n.title)
        .bind(&n.message)
        .bind(&n.data)
        .bind(n.priority.as_str())
        .bind(storage_timestamp(n.timestamp))
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }
}

#[derive(Debug, Clone)]
/// Read the delivered flag of a stored notification.
pub struct GetNotificationDelivered {
    pub id: NotificationId,
}

impl Processor<GetNotificationDelivered> for DatabaseProcessor {
    type Output = Option<bool>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetNotificationDelivered")]
    async fn process(&self, query: GetNotificationDelivered) -> Result<Option<bool>, sqlx::Error> {
        sqlx::query_scalar("SELECT delivered FROM notifications WHERE id = $1")
            .bind(query.id.as_str())
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// List a user's notifications stored after `after_seq`, in storage order.
pub struct ListNotificationsAfter {
    pub user_id: String,
    pub after_seq: i64,
    pub limit: i64,
}

impl Processor<ListNotificationsAfter> for DatabaseProcessor {
    type Output = Vec<NotificationRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListNotificationsAfter")]
    async fn process(
        &self,
        query: ListNotificationsAfter,
    ) -> Result<Vec<NotificationRecord>, sqlx::Error> {
        sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT seq, id, user_id, order_id, kind, title, message, data, priority,
                   created_at, read, delivered
            FROM notifications
            WHERE user_id = $1 AND seq > $2
            ORDER BY seq ASC
            LIMIT $3
            "#,
        )
        .bind(&query.user_id)
        .bind(query.after_seq)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// List a user's oldest undelivered notifications.
pub struct ListUndeliveredNotifications {
    pub user_id: String,
    pub limit: i64,
}

impl Processor<ListUndeliveredNotifications> for DatabaseProcessor {
    type Output = Vec<NotificationRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListUndeliveredNotifications")]
    async fn process(
        &self,
        query: ListUndeliveredNotifications,
    ) -> Result<Vec<NotificationRecord>, sqlx::Error> {
        sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT seq, id, user_id, order_id, kind, title, message, data, priority,
                   created_at, read, delivered
            FROM notifications
            WHERE user_id = $1 AND NOT delivered
            ORDER BY seq ASC
            LIMIT $2
            "#,
        )
        .bind(&query.user_id)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Highest `seq` stored for a user, 0 when there is none.
pub struct GetLatestNotificationSeq {
    pub user_id: String,
}

impl Processor<GetLatestNotificationSeq> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetLatestNotificationSeq")]
    async fn process(&self, query: GetLatestNotificationSeq) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM notifications WHERE user_id = $1")
            .bind(&query.user_id)
            .fetch_one(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Mark many notifications as delivered in a single query.
///
/// Returns the number of rows updated.
pub struct MarkNotificationsDelivered {
    pub ids: Vec<String>,
}

impl Processor<MarkNotificationsDelivered> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkNotificationsDelivered")]
    async fn process(&self, cmd: MarkNotificationsDelivered) -> Result<u64, sqlx::Error> {
        if cmd.ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET delivered = TRUE
            WHERE id = ANY($1) AND delivered = FALSE
            "#,
        )
        .bind(&cmd.ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct MarkNotificationRead {
    pub user_id: String,
    pub id: NotificationId,
}

impl Processor<MarkNotificationRead> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkNotificationRead")]
    async fn process(&self, cmd: MarkNotificationRead) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND id = $2")
            .bind(&cmd.user_id)
            .bind(cmd.id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct ClearNotifications {
    pub user_id: String,
}

impl Processor<ClearNotifications> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ClearNotifications")]
    async fn process(&self, cmd: ClearNotifications) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(&cmd.user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// [`NotificationStore`] backed by the `notifications` table.
#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    db: DatabaseProcessor,
}

impl PgNotificationStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert_if_absent(
        &self,
        notification: &Notification,
    ) -> Result<InsertOutcome, StoreError> {
        let inserted = self
            .db
            .process(InsertNotification {
                notification: notification.clone(),
            })
            .await?;
        if inserted {
            return Ok(InsertOutcome::Inserted);
        }
        // Lost the race against a concurrent clear: treat the row as new
        // but already handed out, so it is not published twice.
        let delivered = self
            .db
            .process(GetNotificationDelivered {
                id: notification.id.clone(),
            })
            .await?
            .unwrap_or(true);
        Ok(InsertOutcome::Existing { delivered })
    }

    async fn list_after(
        &self,
        user_id: &str,
        cursor: u64,
        limit: usize,
    ) -> Result<Vec<StoredNotification>, StoreError> {
        let records = self
            .db
            .process(ListNotificationsAfter {
                user_id: user_id.to_owned(),
                after_seq: i64::try_from(cursor).unwrap_or(i64::MAX),
                limit: i64::try_from(limit).unwrap_or(i64::MAX),
            })
            .await?;
        records.into_iter().map(StoredNotification::try_from).collect()
    }

    async fn list_undelivered(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredNotification>, StoreError> {
        let records = self
            .db
            .process(ListUndeliveredNotifications {
                user_id: user_id.to_owned(),
                limit: i64::try_from(limit).unwrap_or(i64::MAX),
            })
            .await?;
        records.into_iter().map(StoredNotification::try_from).collect()
    }

    async fn latest_cursor(&self, user_id: &str) -> Result<u64, StoreError> {
        let seq = self
            .db
            .process(GetLatestNotificationSeq {
                user_id: user_id.to_owned(),
            })
            .await?;
        Ok(seq.unsigned_abs())
    }

    async fn mark_delivered(&self, ids: &[NotificationId]) -> Result<u64, StoreError> {
        let ids = ids.iter().map(|id| id.as_str().to_owned()).collect();
        Ok(self.db.process(MarkNotificationsDelivered { ids }).await?)
    }

    async fn mark_read(&self, user_id: &str, id: &NotificationId) -> Result<bool, StoreError> {
        Ok(self
            .db
            .process(MarkNotificationRead {
                user_id: user_id.to_owned(),
                id: id.clone(),
            })
            .await?)
    }

    async fn clear(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .db
            .process(ClearNotifications {
                user_id: user_id.to_owned(),
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlvr_sdk::objects::{NotificationType, Priority};
    use time::macros::datetime;

    fn record(kind: &str, priority: &str) -> NotificationRecord {
        NotificationRecord {
            seq: 1,
            id: "ntf_TEST".to_string(),
            user_id: "u-1".to_string(),
            order_id: Some(Uuid::nil()),
            kind: kind.to_string(),
            title: "Delivered".to_string(),
            message: "Enjoy".to_string(),
            data: Some(serde_json::json!({"status": "delivered"})),
            priority: priority.to_string(),
            created_at: datetime!(2026-01-01 12:00:00 UTC),
            read: false,
            delivered: true,
        }
    }

    #[test]
    fn test_record_maps_to_notification() {
        let stored = StoredNotification::try_from(record("order_status", "high")).unwrap();
        assert_eq!(stored.cursor, 1);
        assert_eq!(stored.notification.kind, NotificationType::OrderStatus);
        assert_eq!(stored.notification.priority, Priority::High);
        assert_eq!(stored.notification.id.as_str(), "ntf_TEST");
        assert!(stored.delivered);
        assert!(!stored.read);
    }

    #[test]
    fn test_record_with_unknown_priority_is_corrupt() {
        let err = StoredNotification::try_from(record("order_status", "shouty")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "ntf_TEST"));
    }
}
