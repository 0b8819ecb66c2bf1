use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use woms_core::domain::notification::{Notification, NotificationId};
use woms_core::errors::ApplicationError;
use woms_core::session::Session;

use crate::repositories::NotificationRepository;

pub const DEFAULT_INBOX_LIMIT: u32 = 50;
pub const MAX_INBOX_LIMIT: u32 = 200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InboxView {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    /// Advisory; clients poll rather than hold a connection open.
    pub poll_interval_secs: u64,
}

/// Per-actor view over stored notifications. Anything the caller cannot see is
/// reported as missing.
pub struct NotificationInbox {
    notifications: Arc<dyn NotificationRepository>,
    poll_interval_secs: u64,
}

impl NotificationInbox {
    pub fn new(notifications: Arc<dyn NotificationRepository>, poll_interval_secs: u64) -> Self {
        Self { notifications, poll_interval_secs }
    }

    pub async fn list(
        &self,
        session: &Session,
        unread_only: bool,
        limit: Option<u32>,
    ) -> Result<InboxView, ApplicationError> {
        let limit = limit.unwrap_or(DEFAULT_INBOX_LIMIT).clamp(1, MAX_INBOX_LIMIT);
        let notifications =
            self.notifications.list_for(&session.actor, unread_only, limit).await?;
        let unread_count = self.notifications.unread_count(&session.actor).await?;

        Ok(InboxView { notifications, unread_count, poll_interval_secs: self.poll_interval_secs })
    }

    /// Marking twice is harmless and returns the same read notification.
    pub async fn mark_read(
        &self,
        session: &Session,
        id: &NotificationId,
    ) -> Result<Notification, ApplicationError> {
        let mut notification = self.visible(session, id).await?;
        if !notification.is_read {
            if !self.notifications.mark_read(id).await? {
                return Err(not_found(id));
            }
            notification.mark_read();
        }
        Ok(notification)
    }

    pub async fn delete(&self, session: &Session, id: &NotificationId) -> Result<(), ApplicationError> {
        self.visible(session, id).await?;
        if !self.notifications.delete(id).await? {
            return Err(not_found(id));
        }

        info!(
            event_name = "inbox.notification_deleted",
            correlation_id = %session.correlation_id,
            notification_id = %id.0,
            "notification deleted"
        );
        Ok(())
    }

    async fn visible(
        &self,
        session: &Session,
        id: &NotificationId,
    ) -> Result<Notification, ApplicationError> {
        self.notifications
            .find_by_id(id)
            .await?
            .filter(|notification| notification.recipient.includes(&session.actor))
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &NotificationId) -> ApplicationError {
    ApplicationError::NotFound(format!("notification {}", id.0))
}
