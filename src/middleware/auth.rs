use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    /// True when the token belongs to an admin account; admins may mutate
    /// events they do not own.
    pub is_admin: bool,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Health check and login/registration are reachable without a token.
    let path = req.uri().path().to_string();
    if path == "/health" || path.starts_with("/api/auth/") {
        return Ok(next.run(req).await);
    }

    // Event discovery is public: search and single-event reads need no
    // account. Mutations and favorites stay authenticated.
    if req.method() == axum::http::Method::GET && path.starts_with("/api/events") {
        return Ok(next.run(req).await);
    }

    /// 401 with a stable code so clients only log out when the server
    /// explicitly declined auth (not on network errors).
    fn auth_declined_response() -> Response {
        let body = serde_json::json!({
            "code": "AUTH_DECLINED",
            "message": "Authentication required or session invalid"
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }

    let auth_header = match req.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        Some(h) => h,
        None => return Ok(auth_declined_response()),
    };

    if !auth_header.starts_with("Bearer ") {
        return Ok(auth_declined_response());
    }

    let token = &auth_header[7..];

    let decoding_key = DecodingKey::from_secret(state.config.jwt_secret.as_ref());
    let validation = Validation::new(Algorithm::HS256);

    let token_data = match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(d) => d,
        Err(_) => return Ok(auth_declined_response()),
    };

    let claims = token_data.claims;

    let user_id = match Uuid::parse_str(&claims.user_id) {
        Ok(u) => u,
        Err(_) => return Ok(auth_declined_response()),
    };

    // Verify the user still exists and pick up the current admin flag.
    let is_admin = match sqlx::query_scalar::<_, bool>(
        "SELECT is_admin FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&*state.db_pool)
    .await
    {
        Ok(Some(is_admin)) => is_admin,
        Ok(None) => return Ok(auth_declined_response()),
        Err(e) => {
            tracing::error!("Auth middleware database error: {:?}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let auth_user = AuthUser {
        user_id,
        email: claims.email,
        is_admin,
    };
    req.extensions_mut().insert(auth_user);

    Ok(next.run(req).await)
}
