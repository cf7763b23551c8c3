use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use murmur_types::UserId;
use murmur_types::models::MessageRecord;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub from_id: Option<String>,
}

/// GET /messages?user_id=A&from_id=B
///
/// Both directions of the A/B conversation, oldest first. Either parameter
/// missing is a 400 and the store is never touched.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let (user_id, from_id) = match (
        query.user_id.as_deref().filter(|v| !v.is_empty()),
        query.from_id.as_deref().filter(|v| !v.is_empty()),
    ) {
        (Some(user_id), Some(from_id)) => (parse_id(user_id)?, parse_id(from_id)?),
        _ => return Err(ApiError::BadRequest("user_id and from_id are required")),
    };

    debug!("History query user_id={} from_id={}", user_id, from_id);

    let rows = run_blocking(&state.db, move |db| db.get_conversation(user_id, from_id))
        .await
        .map_err(ApiError::internal("Failed to fetch messages"))?;

    let messages = rows
        .into_iter()
        .map(|row| MessageRecord {
            created_at: row
                .created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|e| {
                    warn!("Corrupt created_at '{}' on message {}: {}", row.created_at, row.id, e);
                    DateTime::<Utc>::default()
                }),
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            from_id: row.from_id,
        })
        .collect();

    Ok(Json(messages))
}

fn parse_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("user_id and from_id must be integers"))
}
