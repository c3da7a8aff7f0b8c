//! Notification dispatch: reserve one (user, event, type) record per match,
//! then publish to the message channel.
//!
//! The reservation is a single atomic insert-if-absent against the store;
//! it is the only synchronization point between concurrent passes over the
//! same event. Publishing is best-effort: a channel failure after a
//! successful reservation is logged and counted, never raised, and the
//! reservation stays so a retry of the same change is not reprocessed.

use std::sync::Arc;

use sqlx::Row;
use uuid::Uuid;

use crate::channel::MessageChannel;
use crate::database::DatabasePool;
use crate::models::{
    EventChange, EventSnapshot, NotificationMessage, NotificationType, UserId,
};

/// Outcome of dispatching to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Reserved and published.
    Delivered,
    /// Reservation key already existed; duplicate suppressed.
    Skipped(String),
    /// Reservation committed but the publish (or the reservation attempt
    /// itself) failed.
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn merge(&mut self, other: DispatchSummary) {
        self.delivered += other.delivered;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Skipped(_) => self.skipped += 1,
            DispatchOutcome::Failed(_) => self.failed += 1,
        }
    }
}

pub struct NotificationDispatcher {
    pool: DatabasePool,
    channel: Arc<dyn MessageChannel>,
}

impl NotificationDispatcher {
    pub fn new(pool: DatabasePool, channel: Arc<dyn MessageChannel>) -> Self {
        Self { pool, channel }
    }

    /// Dispatch one event change to a set of matched users. Infallible by
    /// design: every per-user failure is folded into the summary and logged,
    /// because losing a best-effort notification must never fail the event
    /// mutation that triggered it.
    pub async fn dispatch(
        &self,
        user_ids: &[UserId],
        change: &EventChange,
        event: &EventSnapshot,
    ) -> DispatchSummary {
        let notification_type = NotificationType::from_change(change);
        self.dispatch_as(user_ids, notification_type, change.update_summary(), event)
            .await
    }

    /// Dispatch with an explicit notification type. Used directly by the
    /// reminder job (`upcoming`), which has no lifecycle change.
    pub async fn dispatch_as(
        &self,
        user_ids: &[UserId],
        notification_type: NotificationType,
        update_type: Option<String>,
        event: &EventSnapshot,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for &user_id in user_ids {
            let outcome = self
                .dispatch_one(user_id, notification_type, update_type.clone(), event)
                .await;
            if let DispatchOutcome::Failed(reason) = &outcome {
                tracing::warn!(
                    "Notification for user {} event {} ({}) failed: {}",
                    user_id,
                    event.id,
                    notification_type.as_str(),
                    reason
                );
            }
            summary.record(&outcome);
        }

        tracing::info!(
            "Dispatched event {} ({}): {} delivered, {} skipped, {} failed",
            event.id,
            notification_type.as_str(),
            summary.delivered,
            summary.skipped,
            summary.failed
        );
        summary
    }

    async fn dispatch_one(
        &self,
        user_id: UserId,
        notification_type: NotificationType,
        update_type: Option<String>,
        event: &EventSnapshot,
    ) -> DispatchOutcome {
        // Timing fields only make sense while they are still in the future
        // from the reader's perspective; deletion notices carry none.
        let start_time = match notification_type {
            NotificationType::Created | NotificationType::Updated | NotificationType::Upcoming => {
                Some(event.start_date)
            }
            NotificationType::Deleted => None,
        };

        // Atomic insert-if-absent; a plain read-then-write would race with
        // concurrent passes over the same event. RETURNING only fires when
        // the row was actually inserted, and hands back the user's language
        // for the published message.
        let reserved = sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, event_id, notification_type, title, start_time, language)
            SELECT $1, u.id, $3, $4, $5, $6, u.preferred_language
            FROM users u
            WHERE u.id = $2
            ON CONFLICT (user_id, event_id, notification_type) DO NOTHING
            RETURNING language
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(event.id)
        .bind(notification_type.as_str())
        .bind(&event.title)
        .bind(start_time)
        .fetch_optional(&*self.pool)
        .await;

        let language = match reserved {
            Ok(Some(row)) => match row.try_get::<String, _>("language") {
                Ok(language) => language,
                Err(e) => return DispatchOutcome::Failed(format!("reservation read: {}", e)),
            },
            Ok(None) => return DispatchOutcome::Skipped("already notified".to_string()),
            Err(e) => return DispatchOutcome::Failed(format!("reservation: {}", e)),
        };

        let message = NotificationMessage {
            user_id,
            event_id: event.id,
            notification_type,
            title: event.title.clone(),
            start_time,
            update_type,
            language,
        };

        match self.channel.publish(&message).await {
            Ok(()) => DispatchOutcome::Delivered,
            // The reservation stands: the change is marked handled even
            // though this message was lost. "May fail to notify" is the
            // accepted trade against "may duplicate-notify".
            Err(e) => DispatchOutcome::Failed(format!("publish: {}", e)),
        }
    }
}
