use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use futures_util::future::BoxFuture;
use futures_util::stream::SplitSink;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport closed")]
    Closed,
}

/// Write half of a live connection.
///
/// The ingress loop owns the read half; the registry and the dispatcher only
/// ever see this side.
pub trait Transport: Send + Sync {
    fn send_text(&self, text: String) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Best effort. Closing twice is harmless.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Write half of an axum WebSocket. The inner mutex serializes a dispatcher
/// write against the owning loop's close.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

impl Transport for WsTransport {
    fn send_text(&self, text: String) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(text.into())).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut sink = self.sink.lock().await;
            let _ = sink.close().await;
        })
    }
}
