use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use murmur_types::events::RelayMessage;

use crate::dispatcher::Dispatcher;
use crate::registry::Registry;
use crate::sink::{MessageStore, PersistenceSink};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Capacity of the dispatch queue.
    pub queue_capacity: usize,
    /// How long an ingress loop waits on a full queue before dropping the message.
    pub enqueue_timeout: Duration,
    /// Upper bound on a single peer write (and on closing a dead peer).
    pub write_timeout: Duration,
    /// How long shutdown waits for the queue to drain.
    pub drain_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            enqueue_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("dispatch queue full, message dropped")]
    Full,

    #[error("dispatch queue closed")]
    Closed,
}

/// The relay as one owned component: connection registry, dispatch queue and
/// the dispatcher task draining it. Cheap to clone.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    registry: Registry,
    queue: mpsc::Sender<RelayMessage>,
    config: RelayConfig,
    dropped: AtomicU64,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Relay {
    /// Spawn the dispatcher. Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn MessageStore>, config: RelayConfig) -> Self {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let registry = Registry::new();
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher::new(registry.clone(), PersistenceSink::new(store), config.write_timeout);
        let worker = tokio::spawn(dispatcher.run(rx, shutdown.clone()));

        info!(
            "Relay started (queue capacity {}, write timeout {:?})",
            config.queue_capacity, config.write_timeout
        );

        Self {
            inner: Arc::new(RelayInner {
                registry,
                queue,
                config,
                dropped: AtomicU64::new(0),
                shutdown,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// Push a message onto the dispatch queue. A full queue is waited on for
    /// `enqueue_timeout`; past that the message is dropped and counted.
    pub async fn enqueue(&self, msg: RelayMessage) -> Result<(), EnqueueError> {
        match self.inner.queue.send_timeout(msg, self.inner.config.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(msg)) => {
                let total = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Dispatch queue full, dropped message from user {} ({} dropped so far)",
                    msg.user_id, total
                );
                Err(EnqueueError::Full)
            }
            Err(SendTimeoutError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Messages dropped on queue overflow since start.
    pub fn dropped_messages(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Stop the relay: refuse new connections, drain the queue (bounded by
    /// `drain_timeout`), then close every remaining transport.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let worker = self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut worker) = worker {
            match tokio::time::timeout(self.inner.config.drain_timeout, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Dispatcher task failed: {}", e),
                Err(_) => {
                    warn!(
                        "Dispatch queue not drained after {:?}, discarding the rest",
                        self.inner.config.drain_timeout
                    );
                    worker.abort();
                }
            }
        }

        let peers = self.inner.registry.close();
        let write_timeout = self.inner.config.write_timeout;
        join_all(
            peers
                .iter()
                .map(|peer| tokio::time::timeout(write_timeout, peer.transport.close())),
        )
        .await;

        info!("Relay stopped, closed {} connections", peers.len());
    }
}
