use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::cache::CacheLayer;
use crate::error::{ApiError, FieldError};
use crate::middleware::auth::AuthUser;
use crate::models::{EventChange, EventField, EventSnapshot, GeoPoint};
use crate::services::{
    self, EventSearchService, EventSummary, NotificationDispatcher, PreferenceMatcher,
    SearchCriteria, SearchParams,
};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub address: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub categories: Option<Vec<Uuid>>,
}

#[derive(Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<GeoPoint>,
    pub address: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub categories: Option<Vec<Uuid>>,
}

#[derive(Serialize)]
pub struct EventMutationResponse {
    pub id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub events: Vec<EventSummary>,
    pub pagination: Pagination,
}

fn check_event_fields(
    title: &str,
    location: GeoPoint,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    max_participants: Option<i32>,
    price: Option<f64>,
) -> Result<(), ApiError> {
    let mut errors: Vec<FieldError> = Vec::new();
    if title.trim().is_empty() {
        errors.push(FieldError::new("title", "is required"));
    }
    location.check(&mut errors);
    if start_date >= end_date {
        errors.push(FieldError::new("end_date", "must be after start_date"));
    }
    if let Some(max) = max_participants {
        if max <= 0 {
            errors.push(FieldError::new("max_participants", "must be positive"));
        }
    }
    if let Some(price) = price {
        if !price.is_finite() || price < 0.0 {
            errors.push(FieldError::new("price", "must be non-negative"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Verify every category id exists before attaching any of them.
async fn check_categories_exist(state: &AppState, ids: &[Uuid]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let known: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ANY($1)")
            .bind(ids)
            .fetch_one(&*state.db_pool)
            .await?;
    if known != ids.len() as i64 {
        return Err(ApiError::validation("categories", "contains unknown category ids"));
    }
    Ok(())
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventMutationResponse>), ApiError> {
    check_event_fields(
        &payload.title,
        payload.location,
        payload.start_date,
        payload.end_date,
        payload.max_participants,
        payload.price,
    )?;
    let categories = payload.categories.clone().unwrap_or_default();
    check_categories_exist(&state, &categories).await?;

    let event_id = Uuid::new_v4();

    let mut tx = state.db_pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO events (id, title, description, location, address,
                            start_date, end_date, max_participants, price, created_by)
        VALUES ($1, $2, $3, ST_SetSRID(ST_MakePoint($4, $5), 4326)::geography,
                $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(event_id)
    .bind(payload.title.trim())
    .bind(payload.description.as_deref())
    .bind(payload.location.longitude)
    .bind(payload.location.latitude)
    .bind(payload.address.trim())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.max_participants)
    .bind(payload.price)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?;

    for category_id in &categories {
        sqlx::query(
            "INSERT INTO event_categories (event_id, category_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(category_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    // Best-effort fan-out; runs to completion (reservations included) before
    // we acknowledge, but its failures never fail the create.
    let snapshot = EventSnapshot {
        id: event_id,
        title: payload.title.trim().to_string(),
        location: payload.location,
        start_date: payload.start_date,
        end_date: payload.end_date,
        price: payload.price,
        created_by: auth.user_id,
        category_ids: categories,
    };
    services::notify_event_change(&state, &snapshot, &EventChange::Created).await;

    Ok((
        StatusCode::CREATED,
        Json(EventMutationResponse {
            id: event_id.to_string(),
            message: "Event created successfully".to_string(),
        }),
    ))
}

pub async fn get_event(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = EventSearchService::new(state.db_pool.clone());
    let event = service
        .get_event(event_id, &state.cache)
        .await?
        .ok_or(ApiError::NotFound("Event"))?;

    Ok(Json(serde_json::json!({ "event": event })))
}

pub async fn update_event(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdateEventRequest>,
) -> Result<(StatusCode, Json<EventMutationResponse>), ApiError> {
    let current = sqlx::query(
        r#"
        SELECT e.title, e.description, e.address,
               ST_X(e.location::geometry) AS longitude,
               ST_Y(e.location::geometry) AS latitude,
               e.start_date, e.end_date, e.max_participants, e.price, e.created_by,
               COALESCE((SELECT array_agg(ec.category_id ORDER BY ec.category_id)
                   FROM event_categories ec WHERE ec.event_id = e.id), '{}') AS category_ids
        FROM events e
        WHERE e.id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(&*state.db_pool)
    .await?
    .ok_or(ApiError::NotFound("Event"))?;

    let created_by: Uuid = current.try_get("created_by")?;
    if created_by != auth.user_id && !auth.is_admin {
        return Err(ApiError::Forbidden);
    }

    let current_title: String = current.try_get("title")?;
    let current_description: Option<String> = current.try_get("description")?;
    let current_address: String = current.try_get("address")?;
    let current_location = GeoPoint::new(
        current.try_get("longitude")?,
        current.try_get("latitude")?,
    );
    let current_start: DateTime<Utc> = current.try_get("start_date")?;
    let current_end: DateTime<Utc> = current.try_get("end_date")?;
    let current_max: Option<i32> = current.try_get("max_participants")?;
    let current_price: Option<f64> = current.try_get("price")?;
    let current_categories: Vec<Uuid> = current.try_get("category_ids")?;

    // Merge: absent fields keep their stored value.
    let new_title = payload.title.as_deref().map(str::trim).unwrap_or(&current_title);
    let new_description = payload.description.as_deref().or(current_description.as_deref());
    let new_address = payload.address.as_deref().map(str::trim).unwrap_or(&current_address);
    let new_location = payload.location.unwrap_or(current_location);
    let new_start = payload.start_date.unwrap_or(current_start);
    let new_end = payload.end_date.unwrap_or(current_end);
    let new_max = payload.max_participants.or(current_max);
    let new_price = payload.price.or(current_price);
    let new_categories = match &payload.categories {
        Some(ids) => {
            check_categories_exist(&state, ids).await?;
            let mut sorted = ids.clone();
            sorted.sort();
            sorted.dedup();
            sorted
        }
        None => current_categories.clone(),
    };

    check_event_fields(new_title, new_location, new_start, new_end, new_max, new_price)?;

    // Changed-field set drives update materiality in the matcher.
    let mut changed: Vec<EventField> = Vec::new();
    if new_title != current_title {
        changed.push(EventField::Title);
    }
    if new_description != current_description.as_deref() {
        changed.push(EventField::Description);
    }
    if new_address != current_address {
        changed.push(EventField::Address);
    }
    if new_location != current_location {
        changed.push(EventField::Location);
    }
    if new_start != current_start {
        changed.push(EventField::StartDate);
    }
    if new_end != current_end {
        changed.push(EventField::EndDate);
    }
    if new_max != current_max {
        changed.push(EventField::MaxParticipants);
    }
    if new_price != current_price {
        changed.push(EventField::Price);
    }
    if new_categories != current_categories {
        changed.push(EventField::Categories);
    }

    let mut tx = state.db_pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE events
        SET title = $1, description = $2,
            location = ST_SetSRID(ST_MakePoint($3, $4), 4326)::geography,
            address = $5, start_date = $6, end_date = $7,
            max_participants = $8, price = $9, updated_at = NOW()
        WHERE id = $10
        "#,
    )
    .bind(new_title)
    .bind(new_description)
    .bind(new_location.longitude)
    .bind(new_location.latitude)
    .bind(new_address)
    .bind(new_start)
    .bind(new_end)
    .bind(new_max)
    .bind(new_price)
    .bind(event_id)
    .execute(&mut *tx)
    .await?;

    if payload.categories.is_some() {
        sqlx::query("DELETE FROM event_categories WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        for category_id in &new_categories {
            sqlx::query(
                "INSERT INTO event_categories (event_id, category_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(event_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    state.cache.invalidate(&CacheLayer::event_key(event_id)).await;

    let snapshot = EventSnapshot {
        id: event_id,
        title: new_title.to_string(),
        location: new_location,
        start_date: new_start,
        end_date: new_end,
        price: new_price,
        created_by,
        category_ids: new_categories,
    };
    services::notify_event_change(&state, &snapshot, &EventChange::Updated { changed }).await;

    Ok((
        StatusCode::OK,
        Json(EventMutationResponse {
            id: event_id.to_string(),
            message: "Event updated successfully".to_string(),
        }),
    ))
}

pub async fn delete_event(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<(StatusCode, Json<EventMutationResponse>), ApiError> {
    let service = EventSearchService::new(state.db_pool.clone());
    let snapshot = service
        .load_snapshot(event_id)
        .await?
        .ok_or(ApiError::NotFound("Event"))?;

    if snapshot.created_by != auth.user_id && !auth.is_admin {
        return Err(ApiError::Forbidden);
    }

    // Favorite rows cascade with the event; collect deletion recipients
    // while they still exist.
    let matcher = PreferenceMatcher::new(state.db_pool.clone());
    let recipients = matcher.users_who_favorited(event_id).await?;

    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(event_id)
        .execute(&*state.db_pool)
        .await?;

    state.cache.invalidate(&CacheLayer::event_key(event_id)).await;

    NotificationDispatcher::new(state.db_pool.clone(), state.channel.clone())
        .dispatch(&recipients, &EventChange::Deleted, &snapshot)
        .await;

    Ok((
        StatusCode::OK,
        Json(EventMutationResponse {
            id: event_id.to_string(),
            message: "Event deleted successfully".to_string(),
        }),
    ))
}

pub async fn search_events(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let criteria = SearchCriteria::from_params(&params, &state.config)?;

    let service = EventSearchService::new(state.db_pool.clone());
    let page = service.search(&criteria).await?;

    let pages = if page.total == 0 {
        0
    } else {
        (page.total + criteria.limit - 1) / criteria.limit
    };

    Ok(Json(SearchResponse {
        events: page.events,
        pagination: Pagination {
            total: page.total,
            page: criteria.page,
            limit: criteria.limit,
            pages,
        },
    }))
}

pub async fn favorite_event(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
        .bind(event_id)
        .fetch_one(&*state.db_pool)
        .await?;
    if !exists {
        return Err(ApiError::NotFound("Event"));
    }

    sqlx::query(
        "INSERT INTO favorite_events (user_id, event_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(auth.user_id)
    .bind(event_id)
    .execute(&*state.db_pool)
    .await?;

    Ok(Json(serde_json::json!({"message": "Event added to favorites"})))
}

pub async fn unfavorite_event(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query("DELETE FROM favorite_events WHERE user_id = $1 AND event_id = $2")
        .bind(auth.user_id)
        .bind(event_id)
        .execute(&*state.db_pool)
        .await?;

    Ok(Json(serde_json::json!({"message": "Event removed from favorites"})))
}
