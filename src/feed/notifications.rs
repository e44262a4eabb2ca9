use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::domain::{Notification, NotificationId, NotificationRecord, UserId};
use super::NOTIFICATIONS;
use crate::store::{DynDocumentStore, FieldFilter, StoreError};

/// Append-only per-user activity log
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn append(
        &self,
        target: &UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<NotificationId, StoreError>;

    /// Notifications addressed to `user`, newest first
    async fn list_for(&self, user: &UserId) -> Result<Vec<Notification>, StoreError>;
}

pub struct DocumentNotificationSink {
    store: DynDocumentStore,
}

impl DocumentNotificationSink {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationSink for DocumentNotificationSink {
    async fn append(
        &self,
        target: &UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<NotificationId, StoreError> {
        let record = NotificationRecord {
            target_user_id: target.clone(),
            content: content.to_string(),
            created_at,
        };
        let doc = self
            .store
            .create(NOTIFICATIONS, serde_json::to_value(&record)?)
            .await?;

        tracing::debug!("Notification {} queued for {}", doc.key, target);
        Ok(NotificationId::new(doc.key))
    }

    async fn list_for(&self, user: &UserId) -> Result<Vec<Notification>, StoreError> {
        let filter = FieldFilter::eq("targetUserId", user.as_str());
        let docs = self.store.list(NOTIFICATIONS, Some(&filter)).await?;

        let mut notifications = docs
            .iter()
            .map(Notification::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        notifications.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(notifications)
    }
}

pub type DynNotificationSink = Arc<dyn NotificationSink>;
