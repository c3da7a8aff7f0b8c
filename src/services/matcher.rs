//! Preference matching: decide which users should hear about an event change.

use sqlx::Row;

use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::{EventChange, EventId, EventSnapshot, UserId};

pub struct PreferenceMatcher {
    pool: DatabasePool,
}

impl PreferenceMatcher {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Users to notify for one event change.
    ///
    /// Created/updated events are matched against stored preferences;
    /// deletions fan out unconditionally to everyone who favorited the
    /// event. A non-material update (nothing notification-relevant changed)
    /// matches nobody. An empty result is a normal outcome, not an error.
    pub async fn match_event(
        &self,
        event: &EventSnapshot,
        change: &EventChange,
    ) -> Result<Vec<UserId>, ApiError> {
        match change {
            EventChange::Deleted => self.users_who_favorited(event.id).await,
            EventChange::Created | EventChange::Updated { .. } => {
                if !change.requires_matching() {
                    return Ok(Vec::new());
                }
                self.users_matching_preferences(event).await
            }
        }
    }

    /// The preference query. One pass over users with notifications enabled:
    /// distance against each user's own radius, category overlap (empty
    /// preferred set matches anything), price within the user's bounds
    /// (null bounds are unbounded; events without a price skip the price
    /// predicate entirely). Users without a stored location cannot satisfy
    /// the distance predicate and are excluded, as is the event's author.
    async fn users_matching_preferences(
        &self,
        event: &EventSnapshot,
    ) -> Result<Vec<UserId>, ApiError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id
            FROM users u
            JOIN user_preferences up ON up.user_id = u.id
            WHERE up.notification_enabled = TRUE
              AND u.id <> $1
              AND u.location IS NOT NULL
              AND ST_DWithin(
                  u.location,
                  ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography,
                  up.notification_radius_km * 1000.0
              )
              AND (cardinality(up.preferred_categories) = 0
                   OR up.preferred_categories && $4)
              AND ($5::double precision IS NULL
                   OR ((up.min_price IS NULL OR $5 >= up.min_price)
                       AND (up.max_price IS NULL OR $5 <= up.max_price)))
            ORDER BY u.id
            "#,
        )
        .bind(event.created_by)
        .bind(event.location.longitude)
        .bind(event.location.latitude)
        .bind(&event.category_ids)
        .bind(event.price)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get("id").map_err(ApiError::from))
            .collect()
    }

    /// Reminder audience: users who favorited the event and still have
    /// notifications enabled.
    pub async fn users_to_remind(&self, event_id: EventId) -> Result<Vec<UserId>, ApiError> {
        let rows = sqlx::query(
            r#"
            SELECT fe.user_id
            FROM favorite_events fe
            JOIN user_preferences up ON up.user_id = fe.user_id
            WHERE fe.event_id = $1 AND up.notification_enabled = TRUE
            ORDER BY fe.user_id
            "#,
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get("user_id").map_err(ApiError::from))
            .collect()
    }

    /// Users who saved/favorited the event. Callers dealing with deletion
    /// must run this before the event row (and its cascading favorite rows)
    /// is removed.
    pub async fn users_who_favorited(&self, event_id: EventId) -> Result<Vec<UserId>, ApiError> {
        let rows = sqlx::query(
            "SELECT user_id FROM favorite_events WHERE event_id = $1 ORDER BY user_id",
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get("user_id").map_err(ApiError::from))
            .collect()
    }
}
