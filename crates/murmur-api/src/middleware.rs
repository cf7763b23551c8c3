use axum::{
    Extension, Json,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Value, json};

use murmur_types::UserId;
use murmur_types::api::Claims;

use crate::auth::{AppState, SESSION_COOKIE};
use crate::error::ApiError;

/// Session lifetime, matching the cookie the login handler sets.
pub const SESSION_TTL_SECS: i64 = 3600;

pub fn create_token(secret: &str, user_id: UserId, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::seconds(SESSION_TTL_SECS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Rejects requests without a valid session cookie; passes the claims on as
/// a request extension.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| verify_token(&state.session_secret, cookie.value()))
        .ok_or(ApiError::Unauthorized("Unauthorized"))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn dashboard(Extension(claims): Extension<Claims>) -> Json<Value> {
    Json(json!({
        "message": "Welcome to the dashboard!",
        "userid": claims.sub,
        "username": claims.username,
    }))
}
