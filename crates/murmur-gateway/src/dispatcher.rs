use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use murmur_types::events::RelayMessage;

use crate::registry::Registry;
use crate::sink::PersistenceSink;
use crate::transport::TransportError;

/// Outcome of one fan-out round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
    pub persisted: bool,
}

/// The single consumer of the dispatch queue.
///
/// Each message is fanned out to a registry snapshot and then persisted,
/// strictly one message at a time, so every peer sees messages in queue order.
pub struct Dispatcher {
    registry: Registry,
    sink: PersistenceSink,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Registry, sink: PersistenceSink, write_timeout: Duration) -> Self {
        Self {
            registry,
            sink,
            write_timeout,
        }
    }

    /// Worker loop. On shutdown the queue is closed to new senders and
    /// whatever is already buffered is still dispatched.
    pub async fn run(self, mut queue: mpsc::Receiver<RelayMessage>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                msg = queue.recv() => match msg {
                    Some(msg) => {
                        self.dispatch(msg).await;
                    }
                    None => return,
                },
            }
        }

        queue.close();
        let mut drained = 0usize;
        while let Some(msg) = queue.recv().await {
            self.dispatch(msg).await;
            drained += 1;
        }
        info!("Dispatcher stopped ({} queued messages drained)", drained);
    }

    /// Deliver `msg` to every registered connection not owned by its sender,
    /// drop peers whose write fails, then persist.
    pub async fn dispatch(&self, msg: RelayMessage) -> FanOut {
        let mut report = FanOut::default();

        match serde_json::to_string(&msg) {
            Ok(payload) => {
                let peers = self.registry.snapshot();
                let writes = peers
                    .into_iter()
                    .filter(|peer| peer.user_id != msg.user_id)
                    .map(|peer| {
                        let payload = payload.clone();
                        async move {
                            let result = match timeout(self.write_timeout, peer.transport.send_text(payload)).await {
                                Ok(result) => result,
                                Err(_) => Err(TransportError::Timeout(self.write_timeout)),
                            };
                            if let Err(e) = &result {
                                warn!(
                                    "Dropping connection {} (user {}) after failed write: {}",
                                    peer.conn_id, peer.user_id, e
                                );
                                self.registry.evict(peer.conn_id);
                                let _ = timeout(self.write_timeout, peer.transport.close()).await;
                            }
                            result.is_ok()
                        }
                    });

                for delivered in join_all(writes).await {
                    if delivered {
                        report.delivered += 1;
                    } else {
                        report.dropped += 1;
                    }
                }
            }
            Err(e) => error!("Failed to encode message from user {}: {}", msg.user_id, e),
        }

        debug!(
            "Relayed message from {} to {} peers ({} dropped)",
            msg.user_id, report.delivered, report.dropped
        );

        report.persisted = self.sink.persist(msg).await;
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use uuid::Uuid;

    use super::*;
    use crate::testing::{FailingStore, MemoryStore, MockTransport, decode};
    use crate::transport::Transport;

    const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

    fn dispatcher(registry: &Registry, store: Arc<MemoryStore>) -> Dispatcher {
        Dispatcher::new(registry.clone(), PersistenceSink::new(store), WRITE_TIMEOUT)
    }

    fn hi_from(user_id: i64) -> RelayMessage {
        RelayMessage { user_id, content: "hi".into(), from_id: 9 }
    }

    #[tokio::test]
    async fn fans_out_to_everyone_but_the_sender() {
        let registry = Registry::new();
        let store = Arc::new(MemoryStore::default());
        let (t1, mut rx1) = MockTransport::channel();
        let (t2, mut rx2) = MockTransport::channel();
        let (t3, mut rx3) = MockTransport::channel();
        registry.register(Uuid::new_v4(), 1, t1);
        registry.register(Uuid::new_v4(), 2, t2);
        registry.register(Uuid::new_v4(), 3, t3);

        let report = dispatcher(&registry, store.clone()).dispatch(hi_from(1)).await;

        assert_eq!(report, FanOut { delivered: 2, dropped: 0, persisted: true });
        assert_eq!(decode(&rx2.try_recv().unwrap()), hi_from(1));
        assert_eq!(decode(&rx3.try_recv().unwrap()), hi_from(1));
        assert!(rx1.try_recv().is_err());
        assert_eq!(store.rows(), vec![hi_from(1)]);
    }

    #[tokio::test]
    async fn sender_gets_nothing_on_any_of_its_connections() {
        let registry = Registry::new();
        let (own_a, mut rx_a) = MockTransport::channel();
        let (own_b, mut rx_b) = MockTransport::channel();
        registry.register(Uuid::new_v4(), 1, own_a);
        registry.register(Uuid::new_v4(), 1, own_b);

        let report = dispatcher(&registry, Arc::new(MemoryStore::default()))
            .dispatch(hi_from(1))
            .await;

        assert_eq!(report.delivered, 0);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_peer_is_removed_and_others_still_receive() {
        let registry = Registry::new();
        let store = Arc::new(MemoryStore::default());
        let (sender, _rx1) = MockTransport::channel();
        let dead = MockTransport::failing();
        let (alive, mut rx3) = MockTransport::channel();
        let dead_conn = Uuid::new_v4();
        registry.register(Uuid::new_v4(), 1, sender);
        let dead_evicted = registry.register(dead_conn, 2, dead.clone()).unwrap();
        registry.register(Uuid::new_v4(), 3, alive);

        let report = dispatcher(&registry, store.clone()).dispatch(hi_from(1)).await;

        assert_eq!(report, FanOut { delivered: 1, dropped: 1, persisted: true });
        assert_eq!(decode(&rx3.try_recv().unwrap()), hi_from(1));
        assert!(!registry.contains(dead_conn));
        assert!(dead_evicted.is_cancelled());
        assert!(dead.is_closed());
        assert_eq!(registry.len(), 2);
        assert_eq!(store.rows().len(), 1);
    }

    #[tokio::test]
    async fn closed_transport_counts_as_dead() {
        let registry = Registry::new();
        let (closing, _rx) = MockTransport::channel();
        let conn = Uuid::new_v4();
        registry.register(conn, 2, closing.clone());
        closing.close().await;

        let report = dispatcher(&registry, Arc::new(MemoryStore::default()))
            .dispatch(hi_from(1))
            .await;

        assert_eq!(report.dropped, 1);
        assert!(!registry.contains(conn));
    }

    #[tokio::test]
    async fn stalled_peer_does_not_hold_up_the_round() {
        let registry = Registry::new();
        let stalled = MockTransport::stalled();
        let (alive, mut rx) = MockTransport::channel();
        let stalled_conn = Uuid::new_v4();
        let stalled_evicted = registry.register(stalled_conn, 2, stalled).unwrap();
        registry.register(Uuid::new_v4(), 3, alive);

        let started = Instant::now();
        let report = dispatcher(&registry, Arc::new(MemoryStore::default()))
            .dispatch(hi_from(1))
            .await;

        assert!(started.elapsed() < WRITE_TIMEOUT * 4);
        assert_eq!(report, FanOut { delivered: 1, dropped: 1, persisted: true });
        assert_eq!(decode(&rx.try_recv().unwrap()), hi_from(1));
        assert!(!registry.contains(stalled_conn));
        assert!(stalled_evicted.is_cancelled());
    }

    #[tokio::test]
    async fn persists_even_when_nobody_is_listening() {
        let registry = Registry::new();
        let store = Arc::new(MemoryStore::default());

        let report = dispatcher(&registry, store.clone()).dispatch(hi_from(5)).await;

        assert_eq!(report, FanOut { delivered: 0, dropped: 0, persisted: true });
        assert_eq!(store.rows(), vec![hi_from(5)]);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_undo_delivery() {
        let registry = Registry::new();
        let (peer, mut rx) = MockTransport::channel();
        registry.register(Uuid::new_v4(), 2, peer);

        let dispatcher = Dispatcher::new(registry.clone(), PersistenceSink::new(Arc::new(FailingStore)), WRITE_TIMEOUT);
        let report = dispatcher.dispatch(hi_from(1)).await;

        assert_eq!(report, FanOut { delivered: 1, dropped: 0, persisted: false });
        assert!(rx.try_recv().is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn run_preserves_queue_order_and_drains_on_shutdown() {
        let registry = Registry::new();
        let store = Arc::new(MemoryStore::default());
        let (peer, mut rx) = MockTransport::channel();
        registry.register(Uuid::new_v4(), 2, peer);

        let (tx, queue) = mpsc::channel(16);
        for content in ["a", "b", "c"] {
            tx.send(RelayMessage { user_id: 1, content: content.into(), from_id: 2 })
                .await
                .unwrap();
        }

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        dispatcher(&registry, store.clone()).run(queue, shutdown).await;

        let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| decode(&frame).content)
            .collect();
        assert_eq!(received, vec!["a", "b", "c"]);
        assert_eq!(store.rows().len(), 3);
        assert!(tx.send(hi_from(1)).await.is_err());
    }
}
