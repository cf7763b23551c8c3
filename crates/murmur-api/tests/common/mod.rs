#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use murmur_api::auth::{AppState, AppStateInner};
use murmur_db::Database;
use murmur_gateway::{Relay, RelayConfig};

pub const SECRET: &str = "test-session-secret";

pub struct TestApp {
    pub db: Arc<Database>,
    pub relay: Relay,
    pub router: Router,
}

pub fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let relay = Relay::start(
        db.clone(),
        RelayConfig {
            write_timeout: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(2),
            ..RelayConfig::default()
        },
    );
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        session_secret: SECRET.to_string(),
        secure_cookies: false,
    });
    let router = murmur_api::router(state, relay.clone());
    TestApp { db, relay, router }
}

/// Serve the app on an ephemeral port.
pub async fn serve(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
