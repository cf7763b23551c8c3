use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use murmur_types::UserId;

use crate::transport::Transport;

/// Opaque per-connection key, minted when the socket is accepted.
pub type ConnectionId = Uuid;

/// One registry entry as handed out by [`Registry::snapshot`].
#[derive(Clone)]
pub struct Peer {
    pub conn_id: ConnectionId,
    pub user_id: UserId,
    pub transport: Arc<dyn Transport>,
    /// Cancelled when the connection is dropped from the relay; its ingress
    /// loop stops reading once this fires.
    pub evicted: CancellationToken,
}

struct Entry {
    user_id: UserId,
    transport: Arc<dyn Transport>,
    evicted: CancellationToken,
}

impl Entry {
    fn peer(&self, conn_id: ConnectionId) -> Peer {
        Peer {
            conn_id,
            user_id: self.user_id,
            transport: self.transport.clone(),
            evicted: self.evicted.clone(),
        }
    }
}

/// Live connections, keyed by connection id and tagged with their user.
///
/// Every operation takes the lock for a single map operation only. Nothing
/// here performs I/O, and callers never hold the lock while writing to a peer:
/// they work on the copy returned by `snapshot`.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ConnectionId, Entry>,
    closed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `conn_id` and hand back its eviction
    /// token. Returns `None` only once the registry has been closed for shutdown.
    pub fn register(
        &self,
        conn_id: ConnectionId,
        user_id: UserId,
        transport: Arc<dyn Transport>,
    ) -> Option<CancellationToken> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let evicted = CancellationToken::new();
        let replaced = state.entries.insert(
            conn_id,
            Entry {
                user_id,
                transport,
                evicted: evicted.clone(),
            },
        );
        if let Some(old) = replaced {
            old.evicted.cancel();
        }
        Some(evicted)
    }

    /// Remove the entry if present.
    pub fn unregister(&self, conn_id: ConnectionId) {
        self.lock().entries.remove(&conn_id);
    }

    /// Remove the entry and signal its ingress loop to stop.
    pub fn evict(&self, conn_id: ConnectionId) {
        if let Some(entry) = self.lock().entries.remove(&conn_id) {
            entry.evicted.cancel();
        }
    }

    /// Point-in-time copy of every live connection.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.lock()
            .entries
            .iter()
            .map(|(&conn_id, entry)| entry.peer(conn_id))
            .collect()
    }

    /// Refuse further registrations, evict everything still live and hand it
    /// back for closing.
    pub fn close(&self) -> Vec<Peer> {
        let mut state = self.lock();
        state.closed = true;
        state
            .entries
            .drain()
            .map(|(conn_id, entry)| {
                entry.evicted.cancel();
                entry.peer(conn_id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, conn_id: ConnectionId) -> bool {
        self.lock().entries.contains_key(&conn_id)
    }

    // The map holds no multi-step invariants, so a panic elsewhere can't leave
    // it half-updated.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
