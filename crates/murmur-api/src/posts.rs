use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use murmur_db::models::PostRow;
use murmur_types::api::{CreatePostRequest, UpdatePostRequest};
use murmur_types::models::Post;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

fn to_post(row: PostRow) -> Post {
    Post {
        id: row.id,
        title: row.title,
        body: row.body,
        date_time: row.date_time,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<Post>>, ApiError> {
    let rows = run_blocking(&state.db, |db| db.list_posts())
        .await
        .map_err(ApiError::internal("Failed to fetch posts"))?;

    Ok(Json(rows.into_iter().map(to_post).collect()))
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = run_blocking(&state.db, move |db| db.insert_post(&req.title, &req.body, &req.datetime))
        .await
        .map_err(ApiError::internal("Failed to create post"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post created successfully", "post": to_post(row) })),
    ))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = run_blocking(&state.db, move |db| {
        db.update_post(id, req.title.as_deref(), req.body.as_deref(), req.datetime.as_deref())
    })
    .await
    .map_err(ApiError::internal("Failed to update post"))?
    .ok_or(ApiError::NotFound("Post not found"))?;

    Ok(Json(json!({ "message": "Post updated successfully", "post": to_post(row) })))
}

/// Deleting a missing post still succeeds.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state.db, move |db| db.delete_post(id))
        .await
        .map_err(ApiError::internal("Failed to delete post"))?;

    Ok(Json(json!({ "message": "Post deleted successfully" })))
}
