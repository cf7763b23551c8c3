/// Database row types. These map directly to SQLite rows and stay
/// independent of the murmur-types API models.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub date_time: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub user_id: i64,
    pub from_id: i64,
    pub content: String,
    pub created_at: String,
}
