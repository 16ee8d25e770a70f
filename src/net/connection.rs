//! Connection bookkeeping
//!
//! Every accepted socket gets a process-unique `ConnectionId` and a
//! `ConnectionHandle` wrapping the outbound message queue. Match slots
//! hold only the id; the registry resolves ids to live handles at send
//! time, so a match never keeps a dead connection alive.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::net::protocol::ServerMessage;

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Send-capable view of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub connected_at: Instant,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    /// Queue a message for the writer task. Never blocks: a full queue
    /// means the client is not keeping up, so the frame is dropped (the
    /// next snapshot supersedes it). Returns whether the message was
    /// queued.
    pub fn send(&self, message: ServerMessage) -> bool {
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("{} outbound queue full, dropping message", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("{} outbound queue closed, dropping message", self.id);
                false
            }
        }
    }
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id and register the outbound queue for it.
    pub fn register(
        &self,
        remote_addr: SocketAddr,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> ConnectionHandle {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = ConnectionHandle {
            id,
            remote_addr,
            connected_at: Instant::now(),
            outbound,
        };
        self.connections.write().insert(id, handle.clone());
        debug!("{} registered ({})", id, remote_addr);
        handle
    }

    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id).is_some();
        if removed {
            debug!("{} unregistered", id);
        }
        removed
    }

    /// Look up a live handle. `None` means the connection is gone and the
    /// caller should skip it.
    pub fn resolve(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
