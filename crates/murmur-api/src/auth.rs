use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use tracing::info;

use murmur_db::Database;
use murmur_types::api::{LoginRequest, LoginResponse, RegisterRequest};

use crate::error::ApiError;
use crate::middleware::{SESSION_TTL_SECS, create_token};
use crate::{run_blocking, run_cpu};

pub const SESSION_COOKIE: &str = "session";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub session_secret: String,
    /// Mark the session cookie `Secure`. Off in dev mode, where the frontend runs on plain http.
    pub secure_cookies: bool,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("username, email and password are required"));
    }

    let email = req.email.clone();
    let existing = run_blocking(&state.db, move |db| db.get_user_by_email(&email))
        .await
        .map_err(ApiError::internal("Failed to register user"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email already registered"));
    }

    // Hash password with Argon2id
    let password = req.password.clone();
    let password_hash = run_cpu(move || hash_password(&password))
        .await
        .map_err(ApiError::internal("Failed to hash password"))?;

    // A concurrent registration can still win the race past the check above.
    let user_id = run_blocking(&state.db, move |db| {
        db.create_user(&req.username, &req.email, &password_hash)
    })
    .await
    .map_err(ApiError::internal("Failed to register user"))?
    .ok_or(ApiError::Conflict("Email already registered"))?;

    info!("Registered user {}", user_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.clone();
    let user = run_blocking(&state.db, move |db| db.get_user_by_email(&email))
        .await
        .map_err(ApiError::internal("Failed to look up user"))?
        .ok_or(ApiError::Unauthorized("Invalid email or password"))?;

    let stored_hash = user.password.clone();
    let password = req.password;
    let verified = run_cpu(move || verify_password(&password, &stored_hash))
        .await
        .map_err(ApiError::internal("Failed to verify password"))?;
    if !verified {
        return Err(ApiError::Unauthorized("Invalid email or password"));
    }

    let token = create_token(&state.session_secret, user.id, &user.username)
        .map_err(ApiError::internal("Failed to create session"))?;

    Ok((
        jar.add(session_cookie(token, state.secure_cookies)),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            userid: user.id,
            username: user.username,
        }),
    ))
}

/// Session cookie carrying the JWT. Lives exactly as long as the token.
fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(SESSION_TTL_SECS))
        .build()
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2: {}", e))?;
    Ok(hash.to_string())
}

/// `Ok(false)` on a wrong password; an unparsable stored hash is an error.
fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed_hash =
        PasswordHash::new(stored_hash).map_err(|e| anyhow::anyhow!("stored password hash is corrupt: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(json!({ "message": "Logout successful" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn corrupt_stored_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn session_cookie_expires_with_the_token() {
        let cookie = session_cookie("token".to_string(), false);
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(SESSION_TTL_SECS)));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
