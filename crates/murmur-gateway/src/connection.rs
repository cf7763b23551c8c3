use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use murmur_types::events::RelayMessage;

use crate::identity::ConnectParams;
use crate::registry::ConnectionId;
use crate::relay::{EnqueueError, Relay};
use crate::transport::{Transport, WsTransport};

/// GET /ws?user_id=..&from_id=..
///
/// The identity is resolved before the upgrade: a bad query gets a 400 and no
/// socket is ever accepted.
pub async fn ws_upgrade(
    State(relay): State<Relay>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let params = match ConnectParams::from_query(&query) {
        Ok(params) => params,
        Err(e) => {
            warn!("Rejected relay connection: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_connection(socket, relay, params))
}

/// Owns one accepted socket for its whole life: register, run the ingress
/// loop, then deregister and close.
pub async fn handle_connection(socket: WebSocket, relay: Relay, params: ConnectParams) {
    let (sink, stream) = socket.split();
    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(sink));
    let conn_id = Uuid::new_v4();
    let close_timeout = relay.config().write_timeout;

    let Some(evicted) = relay.registry().register(conn_id, params.user_id, transport.clone()) else {
        info!("Relay shutting down, refusing connection for user {}", params.user_id);
        let _ = tokio::time::timeout(close_timeout, transport.close()).await;
        return;
    };

    info!(
        "User {} connected to relay (conn {}, counterpart {:?})",
        params.user_id, conn_id, params.from_id
    );

    run_ingress(&relay, conn_id, params, stream, evicted).await;

    relay.registry().unregister(conn_id);
    let _ = tokio::time::timeout(close_timeout, transport.close()).await;

    info!("User {} disconnected from relay (conn {})", params.user_id, conn_id);
}

/// Read frames until the peer goes away, sends something undecodable, or is
/// evicted from the relay. Every decoded message is stamped with the
/// connection's identity and queued for dispatch, in read order.
pub async fn run_ingress<S>(
    relay: &Relay,
    conn_id: ConnectionId,
    params: ConnectParams,
    mut frames: S,
    evicted: CancellationToken,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = evicted.cancelled() => {
                debug!("Conn {} (user {}) evicted, no longer reading", conn_id, params.user_id);
                break;
            }
            frame = frames.next() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Read error on conn {}: {}", conn_id, e);
                break;
            }
        };

        let decoded = match frame {
            Message::Text(text) => serde_json::from_str::<RelayMessage>(&text),
            Message::Binary(data) => serde_json::from_slice::<RelayMessage>(&data),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        let mut msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                warn!("User {} sent an undecodable frame on conn {}: {}", params.user_id, conn_id, e);
                break;
            }
        };
        params.stamp(&mut msg);

        match relay.enqueue(msg).await {
            Ok(()) => {}
            // Already counted and logged; the connection stays up.
            Err(EnqueueError::Full) => {}
            Err(EnqueueError::Closed) => break,
        }
    }
}
