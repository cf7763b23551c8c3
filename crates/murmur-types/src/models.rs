use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Public view of a user. The password hash never leaves the db crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub body: String,
    #[serde(rename = "datetime")]
    pub date_time: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A relayed message after the store has accepted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub user_id: UserId,
    pub content: String,
    pub from_id: UserId,
    pub created_at: DateTime<Utc>,
}
