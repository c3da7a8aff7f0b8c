//! Notification types: what gets recorded in the `notifications` table and
//! what gets published on the message channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::models::event::EventChange;
use crate::models::ids::{EventId, NotificationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Created,
    Updated,
    Deleted,
    Upcoming,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Created => "created",
            NotificationType::Updated => "updated",
            NotificationType::Deleted => "deleted",
            NotificationType::Upcoming => "upcoming",
        }
    }

    pub fn from_change(change: &EventChange) -> Self {
        match change {
            EventChange::Created => NotificationType::Created,
            EventChange::Updated { .. } => NotificationType::Updated,
            EventChange::Deleted => NotificationType::Deleted,
        }
    }
}

/// Wire format published on the message channel. Consumers (email/push
/// renderers) live outside this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub user_id: UserId,
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    pub language: String,
}

/// Persisted notification row, read back for the per-user listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub notification_type: String,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for NotificationRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            event_id: row.try_get("event_id")?,
            notification_type: row.try_get("notification_type")?,
            title: row.try_get("title")?,
            start_time: row.try_get("start_time")?,
            language: row.try_get("language")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
