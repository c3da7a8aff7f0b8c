//! Read side of event discovery: radius search with pagination metadata and
//! cached single-event lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::cache::CacheLayer;
use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::{CategoryId, EventId, EventSnapshot, GeoPoint, UserId};
use crate::services::query::{build_count_query, build_page_query, SearchCriteria};

/// One search hit: event fields plus distance from the search center and
/// rating aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub address: String,
    pub longitude: f64,
    pub latitude: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub created_by: UserId,
    pub category_ids: Vec<CategoryId>,
    /// Kilometers from the search center.
    pub distance: f64,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EventSummary {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            address: row.try_get("address")?,
            longitude: row.try_get("longitude")?,
            latitude: row.try_get("latitude")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            max_participants: row.try_get("max_participants")?,
            price: row.try_get("price")?,
            created_by: row.try_get("created_by")?,
            category_ids: row.try_get("category_ids")?,
            distance: row.try_get("distance_km")?,
            average_rating: row.try_get("average_rating")?,
            rating_count: row.try_get("rating_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Single-event detail view (no distance; cacheable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDetail {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub address: String,
    pub longitude: f64,
    pub latitude: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub created_by: UserId,
    pub category_ids: Vec<CategoryId>,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EventDetail {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            address: row.try_get("address")?,
            longitude: row.try_get("longitude")?,
            latitude: row.try_get("latitude")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            max_participants: row.try_get("max_participants")?,
            price: row.try_get("price")?,
            created_by: row.try_get("created_by")?,
            category_ids: row.try_get("category_ids")?,
            average_rating: row.try_get("average_rating")?,
            rating_count: row.try_get("rating_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug)]
pub struct SearchPage {
    pub events: Vec<EventSummary>,
    pub total: i64,
}

pub struct EventSearchService {
    pool: DatabasePool,
}

impl EventSearchService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Run the page query and the count query for the same criteria. Both
    /// share one predicate set by construction, so `total` always agrees
    /// with the page contents. Read-only; search listings bypass the cache.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<SearchPage, ApiError> {
        let events = build_page_query(criteria)
            .build_query_as::<EventSummary>()
            .fetch_all(&*self.pool)
            .await?;

        let total: i64 = build_count_query(criteria)
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await?;

        Ok(SearchPage { events, total })
    }

    /// Single-event lookup, read-through the cache.
    pub async fn get_event(
        &self,
        event_id: EventId,
        cache: &CacheLayer,
    ) -> Result<Option<EventDetail>, ApiError> {
        let key = CacheLayer::event_key(event_id);
        if let Some(cached) = cache.get_json::<EventDetail>(&key).await {
            return Ok(Some(cached));
        }

        let event = sqlx::query_as::<_, EventDetail>(
            r#"
            SELECT e.id, e.title, e.description, e.address,
                   ST_X(e.location::geometry) AS longitude,
                   ST_Y(e.location::geometry) AS latitude,
                   e.start_date, e.end_date, e.max_participants, e.price,
                   e.created_by, e.created_at, e.updated_at,
                   COALESCE((SELECT AVG(er.rating) FROM event_ratings er
                       WHERE er.event_id = e.id), 0)::double precision AS average_rating,
                   (SELECT COUNT(*) FROM event_ratings er
                       WHERE er.event_id = e.id) AS rating_count,
                   COALESCE((SELECT array_agg(ec.category_id) FROM event_categories ec
                       WHERE ec.event_id = e.id), '{}') AS category_ids
            FROM events e
            WHERE e.id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;

        if let Some(event) = &event {
            cache.set_json(&key, event).await;
        }

        Ok(event)
    }

    /// Snapshot of an event for the notification pipeline.
    pub async fn load_snapshot(
        &self,
        event_id: EventId,
    ) -> Result<Option<EventSnapshot>, ApiError> {
        let row = sqlx::query(
            r#"
            SELECT e.id, e.title,
                   ST_X(e.location::geometry) AS longitude,
                   ST_Y(e.location::geometry) AS latitude,
                   e.start_date, e.end_date, e.price, e.created_by,
                   COALESCE((SELECT array_agg(ec.category_id) FROM event_categories ec
                       WHERE ec.event_id = e.id), '{}') AS category_ids
            FROM events e
            WHERE e.id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(EventSnapshot {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            location: GeoPoint::new(row.try_get("longitude")?, row.try_get("latitude")?),
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            price: row.try_get("price")?,
            created_by: row.try_get("created_by")?,
            category_ids: row.try_get("category_ids")?,
        }))
    }
}
