use axum::{extract::State, response::Json, Extension};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{ApiError, FieldError};
use crate::middleware::auth::AuthUser;
use crate::AppState;

#[derive(Serialize)]
pub struct PreferencesResponse {
    pub notification_enabled: bool,
    pub preferred_categories: Vec<Uuid>,
    pub notification_radius_km: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Partial update; absent fields keep their stored value. An empty category
/// list is meaningful (it means "any category"), so it is distinct from the
/// field being absent.
#[derive(Deserialize)]
pub struct UpdatePreferencesRequest {
    pub notification_enabled: Option<bool>,
    pub preferred_categories: Option<Vec<Uuid>>,
    pub notification_radius_km: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let row = sqlx::query(
        "SELECT notification_enabled, preferred_categories, notification_radius_km, \
         min_price, max_price FROM user_preferences WHERE user_id = $1",
    )
    .bind(auth.user_id)
    .fetch_optional(&*state.db_pool)
    .await?
    .ok_or(ApiError::NotFound("Preferences"))?;

    Ok(Json(PreferencesResponse {
        notification_enabled: row.try_get("notification_enabled")?,
        preferred_categories: row.try_get("preferred_categories")?,
        notification_radius_km: row.try_get("notification_radius_km")?,
        min_price: row.try_get("min_price")?,
        max_price: row.try_get("max_price")?,
    }))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let mut errors: Vec<FieldError> = Vec::new();

    if let Some(radius) = payload.notification_radius_km {
        if !radius.is_finite() || radius <= 0.0 {
            errors.push(FieldError::new("notification_radius_km", "must be positive"));
        }
    }
    if let Some(min) = payload.min_price {
        if !min.is_finite() || min < 0.0 {
            errors.push(FieldError::new("min_price", "must be non-negative"));
        }
    }
    if let Some(max) = payload.max_price {
        if !max.is_finite() || max < 0.0 {
            errors.push(FieldError::new("max_price", "must be non-negative"));
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    if let Some(categories) = &payload.preferred_categories {
        if !categories.is_empty() {
            let known: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ANY($1)")
                    .bind(categories)
                    .fetch_one(&*state.db_pool)
                    .await?;
            if known != categories.len() as i64 {
                return Err(ApiError::validation(
                    "preferred_categories",
                    "contains unknown category ids",
                ));
            }
        }
    }

    let current = sqlx::query(
        "SELECT min_price, max_price FROM user_preferences WHERE user_id = $1",
    )
    .bind(auth.user_id)
    .fetch_optional(&*state.db_pool)
    .await?
    .ok_or(ApiError::NotFound("Preferences"))?;

    // Bounds are checked against their effective (merged) values so a
    // partial update cannot invert the stored range.
    let merged_min = payload.min_price.or(current.try_get("min_price")?);
    let merged_max = payload.max_price.or(current.try_get("max_price")?);
    if let (Some(min), Some(max)) = (merged_min, merged_max) {
        if min > max {
            return Err(ApiError::validation("min_price", "must not exceed max_price"));
        }
    }

    let row = sqlx::query(
        r#"
        UPDATE user_preferences
        SET notification_enabled = COALESCE($2, notification_enabled),
            preferred_categories = COALESCE($3, preferred_categories),
            notification_radius_km = COALESCE($4, notification_radius_km),
            min_price = COALESCE($5, min_price),
            max_price = COALESCE($6, max_price),
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING notification_enabled, preferred_categories,
                  notification_radius_km, min_price, max_price
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.notification_enabled)
    .bind(payload.preferred_categories)
    .bind(payload.notification_radius_km)
    .bind(payload.min_price)
    .bind(payload.max_price)
    .fetch_one(&*state.db_pool)
    .await?;

    Ok(Json(PreferencesResponse {
        notification_enabled: row.try_get("notification_enabled")?,
        preferred_categories: row.try_get("preferred_categories")?,
        notification_radius_km: row.try_get("notification_radius_km")?,
        min_price: row.try_get("min_price")?,
        max_price: row.try_get("max_price")?,
    }))
}
