use axum::{Json, extract::State};

use murmur_types::models::User;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// GET /users. Ids, names and emails only.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let rows = run_blocking(&state.db, |db| db.list_users())
        .await
        .map_err(ApiError::internal("Failed to fetch users"))?;

    Ok(Json(
        rows.into_iter()
            .map(|row| User {
                id: row.id,
                username: row.username,
                email: row.email,
            })
            .collect(),
    ))
}
