use std::sync::Arc;

use tracing::error;

use murmur_db::Database;
use murmur_types::events::RelayMessage;

/// Durable append of relayed messages. Implementations may block; the sink
/// always calls them from the blocking pool.
pub trait MessageStore: Send + Sync + 'static {
    fn append(&self, msg: &RelayMessage) -> anyhow::Result<()>;
}

impl MessageStore for Database {
    fn append(&self, msg: &RelayMessage) -> anyhow::Result<()> {
        self.insert_message(msg.user_id, msg.from_id, &msg.content)?;
        Ok(())
    }
}

/// Hands dispatched messages to the store. Failures are logged and dropped:
/// delivery has already happened and nothing is retried.
#[derive(Clone)]
pub struct PersistenceSink {
    store: Arc<dyn MessageStore>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Returns whether the store accepted the message.
    pub async fn persist(&self, msg: RelayMessage) -> bool {
        let store = self.store.clone();
        let (sender, counterpart) = (msg.user_id, msg.from_id);

        match tokio::task::spawn_blocking(move || store.append(&msg)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Failed to persist message {} -> {}: {:#}", sender, counterpart, e);
                false
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                false
            }
        }
    }
}
