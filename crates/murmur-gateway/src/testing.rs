//! Test doubles for transports and stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use murmur_types::events::RelayMessage;

use crate::sink::MessageStore;
use crate::transport::{Transport, TransportError};

enum Mode {
    Channel(mpsc::UnboundedSender<String>),
    Failing,
    Stalled,
}

pub struct MockTransport {
    mode: Mode,
    closed: AtomicBool,
}

impl MockTransport {
    /// Delivers every frame to the returned receiver until closed.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::with_mode(Mode::Channel(tx))), rx)
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::with_mode(Mode::Failing))
    }

    /// Every write hangs forever.
    pub fn stalled() -> Arc<Self> {
        Arc::new(Self::with_mode(Mode::Stalled))
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for MockTransport {
    fn send_text(&self, text: String) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            match &self.mode {
                Mode::Channel(tx) => tx.send(text).map_err(|_| TransportError::Closed),
                Mode::Failing => Err(TransportError::Closed),
                Mode::Stalled => futures_util::future::pending().await,
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
        })
    }
}

pub fn decode(frame: &str) -> RelayMessage {
    serde_json::from_str(frame).expect("relay frame is valid json")
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<RelayMessage>>,
}

impl MemoryStore {
    pub fn rows(&self) -> Vec<RelayMessage> {
        self.rows.lock().unwrap().clone()
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, msg: &RelayMessage) -> anyhow::Result<()> {
        self.rows.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

pub struct FailingStore;

impl MessageStore for FailingStore {
    fn append(&self, _msg: &RelayMessage) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}
