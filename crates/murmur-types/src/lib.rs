pub mod api;
pub mod events;
pub mod models;

/// User identifiers are the integer primary keys of the `users` table.
pub type UserId = i64;
