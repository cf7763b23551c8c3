use crate::models::{MessageRow, PostRow, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode};

impl Database {
    // -- Users --

    /// Inserts a user and returns the assigned id, or `None` if the email is
    /// already taken.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (username, email, password) VALUES (?1, ?2, ?3)",
                (username, email, password_hash),
            ) {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, username, email, password, created_at FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Posts --

    pub fn list_posts(&self) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, body, date_time, created_at, updated_at FROM posts ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, id))
    }

    pub fn insert_post(&self, title: &str, body: &str, date_time: &str) -> Result<PostRow> {
        let now = timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (title, body, date_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                (title, body, date_time, &now),
            )?;
            Ok(PostRow {
                id: conn.last_insert_rowid(),
                title: title.to_string(),
                body: body.to_string(),
                date_time: date_time.to_string(),
                created_at: now.clone(),
                updated_at: now.clone(),
            })
        })
    }

    /// Overwrites the given fields, keeping the stored value for `None`.
    /// Returns `None` when the post does not exist.
    pub fn update_post(
        &self,
        id: i64,
        title: Option<&str>,
        body: Option<&str>,
        date_time: Option<&str>,
    ) -> Result<Option<PostRow>> {
        let now = timestamp();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET
                    title = COALESCE(?2, title),
                    body = COALESCE(?3, body),
                    date_time = COALESCE(?4, date_time),
                    updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id, title, body, date_time, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_post(conn, id)
        })
    }

    /// Returns whether a row was removed.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])? > 0))
    }

    // -- Messages --

    /// Appends a relayed message. `created_at` is assigned here.
    pub fn insert_message(&self, user_id: i64, from_id: i64, content: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (user_id, from_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, from_id, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Both directions of the conversation between `a` and `b`, oldest first.
    pub fn get_conversation(&self, a: i64, b: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, from_id, content, created_at
                 FROM messages
                 WHERE (user_id = ?1 AND from_id = ?2) OR (user_id = ?2 AND from_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![a, b], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        from_id: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn query_user<P: rusqlite::ToSql>(conn: &Connection, column: &str, value: P) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn query_post(conn: &Connection, id: i64) -> Result<Option<PostRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, body, date_time, created_at, updated_at FROM posts WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], post_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        date_time: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
