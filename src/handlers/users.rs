use axum::{extract::State, response::Json, Extension};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::models::{GeoPoint, NotificationRecord};
use crate::AppState;

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub longitude: f64,
    pub latitude: f64,
}

/// Update the user's last-known location; preference matching uses it as
/// the center of the user's notification radius.
pub async fn update_location(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let location = GeoPoint::new(payload.longitude, payload.latitude);
    location.validate()?;

    sqlx::query(
        "UPDATE users SET location = ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography, \
         updated_at = NOW() WHERE id = $3",
    )
    .bind(location.longitude)
    .bind(location.latitude)
    .bind(auth.user_id)
    .execute(&*state.db_pool)
    .await?;

    Ok(Json(serde_json::json!({"message": "Location updated successfully"})))
}

/// Most recent notification records for the authenticated user.
pub async fn get_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let notifications = sqlx::query_as::<_, NotificationRecord>(
        "SELECT id, user_id, event_id, notification_type, title, start_time, language, \
         created_at FROM notifications WHERE user_id = $1 \
         ORDER BY created_at DESC LIMIT 50",
    )
    .bind(auth.user_id)
    .fetch_all(&*state.db_pool)
    .await?;

    Ok(Json(serde_json::json!({ "notifications": notifications })))
}
