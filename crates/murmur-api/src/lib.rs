pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod posts;
pub mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use murmur_db::Database;
use murmur_gateway::Relay;
use murmur_gateway::connection;

use crate::auth::AppState;

/// Every route the server exposes, minus the CORS and tracing layers which
/// the binary adds on top.
pub fn router(state: AppState, relay: Relay) -> Router {
    let public_routes = Router::new()
        .route("/ping", get(ping))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/users", get(users::list_users))
        .route("/messages", get(messages::get_history))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/{id}", put(posts::update_post).delete(posts::delete_post))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/", get(middleware::dashboard))
        .route("/layout", get(middleware::dashboard))
        .route_layer(axum::middleware::from_fn_with_state(state, middleware::require_session));

    let ws_route = Router::new()
        .route("/ws", get(connection::ws_upgrade))
        .with_state(relay);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// Run a database call on the blocking pool.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

/// Run CPU-bound work, such as password hashing, on the blocking pool.
pub(crate) async fn run_cpu<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
