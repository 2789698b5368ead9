//! Broadcast registry for messages posted out of a worker
//!
//! Each control-channel connection registers an outbound queue. Workers post
//! through the shared [`Messenger`]; every live connection receives a copy.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Identifier of a registered connection
pub type ClientId = u64;

/// Process-wide registry of control connections
#[derive(Default)]
pub struct Messenger {
    next_id: AtomicU64,
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<String>>>,
}

impl Messenger {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue
    pub fn add(&self, outbound: mpsc::UnboundedSender<String>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.clients.lock().insert(id, outbound);
        id
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub fn remove(&self, id: ClientId) -> bool {
        self.clients.lock().remove(&id).is_some()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Whether no connection is registered
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Send `message` to every registered connection.
    ///
    /// Iterates a snapshot of the registry; connections whose queue is closed
    /// are skipped. Returns how many connections accepted the message.
    pub fn broadcast(&self, message: &serde_json::Value) -> usize {
        let text = message.to_string();
        let snapshot: Vec<_> = self.clients.lock().values().cloned().collect();
        snapshot
            .iter()
            .filter(|outbound| outbound.send(text.clone()).is_ok())
            .count()
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("clients", &self.len())
            .finish()
    }
}
