use axum::{extract::State, http::StatusCode, response::Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{ApiError, FieldError};
use crate::middleware::auth::Claims;
use crate::models::GeoPoint;
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub preferred_language: Option<String>,
    /// Optional initial last-known location.
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub email: String,
}

fn generate_jwt_token(
    user_id: &Uuid,
    email: &str,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::seconds(expiration_secs as i64)).timestamp() as usize;
    let claims = Claims {
        user_id: user_id.to_string(),
        email: email.to_string(),
        exp,
    };

    let header = Header::new(Algorithm::HS256);
    let encoding_key = EncodingKey::from_secret(secret.as_ref());
    encode(&header, &claims, &encoding_key)
}

/// Public registration: create the account plus its default notification
/// preferences row in one transaction, then auto sign-in.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = payload.email.trim().to_lowercase();
    let mut errors: Vec<FieldError> = Vec::new();
    if email.is_empty() || !email.contains('@') {
        errors.push(FieldError::new("email", "a valid email is required"));
    }
    if payload.password.len() < 8 {
        errors.push(FieldError::new("password", "must be at least 8 characters"));
    }
    if payload.first_name.trim().is_empty() {
        errors.push(FieldError::new("first_name", "is required"));
    }
    if payload.last_name.trim().is_empty() {
        errors.push(FieldError::new("last_name", "is required"));
    }
    if let Some(location) = &payload.location {
        location.check(&mut errors);
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let existing = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
    )
    .bind(&email)
    .fetch_one(&*state.db_pool)
    .await?;

    if existing {
        return Err(ApiError::Conflict("This email is already registered".to_string()));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(|e| {
        tracing::error!("register: hash: {:?}", e);
        ApiError::Internal("Failed to create account")
    })?;

    let user_id = Uuid::new_v4();
    let language = payload
        .preferred_language
        .as_deref()
        .unwrap_or("en")
        .to_string();

    let mut tx = state.db_pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name,
                           location, preferred_language)
        VALUES ($1, $2, $3, $4, $5,
                CASE WHEN $6::double precision IS NULL THEN NULL
                     ELSE ST_SetSRID(ST_MakePoint($6, $7), 4326)::geography END,
                $8)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.location.map(|l| l.longitude))
    .bind(payload.location.map(|l| l.latitude))
    .bind(&language)
    .execute(&mut *tx)
    .await?;

    // Preferences are created alongside the user with defaults; the
    // preference endpoint only ever updates this row.
    sqlx::query("INSERT INTO user_preferences (user_id) VALUES ($1)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let token = generate_jwt_token(
        &user_id,
        &email,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )
    .map_err(|e| {
        tracing::error!("register: jwt: {:?}", e);
        ApiError::Internal("Failed to create account")
    })?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user_id: user_id.to_string(),
            email,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::validation("email", "is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("password", "is required"));
    }

    let user = sqlx::query("SELECT id, email, password_hash FROM users WHERE email = $1 LIMIT 1")
        .bind(&email)
        .fetch_optional(&*state.db_pool)
        .await?;

    let Some(user) = user else {
        return Err(auth_declined());
    };

    let user_id: Uuid = user.try_get("id")?;
    let password_hash: String = user.try_get("password_hash")?;

    let valid = verify(&payload.password, &password_hash).map_err(|e| {
        tracing::error!("Error verifying password: {:?}", e);
        ApiError::Internal("Authentication error")
    })?;

    if !valid {
        return Err(auth_declined());
    }

    let token = generate_jwt_token(
        &user_id,
        &email,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )
    .map_err(|e| {
        tracing::error!("Error generating JWT: {:?}", e);
        ApiError::Internal("Failed to generate token")
    })?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            token,
            user_id: user_id.to_string(),
            email,
        }),
    ))
}

fn auth_declined() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".to_string())
}
