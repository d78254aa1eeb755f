//! Registry of open channel connections.
//!
//! Entries are keyed by connection id in a sharded map.  Each entry holds
//! the sending half of the connection's close signal; removing the entry is
//! the only way to take it, so of several concurrent close requests exactly
//! one reaches the connection.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::oneshot;

use ng_protocol::{CloseReason, Role};

struct Entry {
    role: Role,
    opened_at: DateTime<Utc>,
    close_tx: oneshot::Sender<CloseReason>,
}

/// Summary returned by [`ChannelRegistry::list`].
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub connection_id: String,
    pub role: Role,
    pub opened_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ChannelRegistry {
    conns: DashMap<String, Entry>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open connection.  The returned receiver resolves when the
    /// gateway asks the connection to close.
    pub fn register(&self, connection_id: &str, role: Role) -> oneshot::Receiver<CloseReason> {
        let (close_tx, close_rx) = oneshot::channel();
        self.conns.insert(
            connection_id.to_owned(),
            Entry {
                role,
                opened_at: Utc::now(),
                close_tx,
            },
        );
        close_rx
    }

    /// Ask one connection to close.  Returns `false` if it was already
    /// closing or unknown.
    pub fn close(&self, connection_id: &str, reason: CloseReason) -> bool {
        match self.conns.remove(connection_id) {
            Some((_, entry)) => {
                let _ = entry.close_tx.send(reason);
                true
            }
            None => false,
        }
    }

    /// Ask every open connection to close.  Returns how many were signalled.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let ids: Vec<String> = self.conns.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.close(id, reason)).count()
    }

    /// Remove a connection that is closing on its own.  Returns `false` if
    /// a close request already removed it.
    pub fn deregister(&self, connection_id: &str) -> bool {
        self.conns.remove(connection_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    pub fn list(&self) -> Vec<ChannelInfo> {
        self.conns
            .iter()
            .map(|e| ChannelInfo {
                connection_id: e.key().clone(),
                role: e.value().role,
                opened_at: e.value().opened_at,
            })
            .collect()
    }
}
