//! Real-time relay: live connection registry, per-connection ingress loops,
//! the serialized broadcast dispatcher and its handoff to the message store.

pub mod connection;
pub mod dispatcher;
pub mod identity;
pub mod registry;
pub mod relay;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod testing;

pub use relay::{EnqueueError, Relay, RelayConfig};
