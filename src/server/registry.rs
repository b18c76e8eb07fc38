//! Registry of in-flight sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::SessionId;

/// One running session task.
#[derive(Debug)]
pub struct SessionEntry {
    /// Remote address, when the session came from a socket.
    pub peer: Option<SocketAddr>,
    /// Time the session was spawned.
    pub started_at: Instant,
    handle: JoinHandle<()>,
}

/// Sessions the supervisor is waiting on, keyed by id.
///
/// Owned by the supervisor task alone; session tasks never see it. They
/// report completion through a [`CompletionGuard`] instead.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SessionId, peer: Option<SocketAddr>, handle: JoinHandle<()>) {
        self.sessions.insert(
            id,
            SessionEntry {
                peer,
                started_at: Instant::now(),
                handle,
            },
        );
    }

    /// Remove a finished session. Returns `None` if it was already gone.
    pub fn remove(&mut self, id: &SessionId) -> Option<SessionEntry> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Abort every remaining session task.
    ///
    /// Returns how many were aborted.
    pub fn abort_all(&mut self) -> usize {
        let count = self.sessions.len();
        for (_, entry) in self.sessions.drain() {
            entry.handle.abort();
        }
        count
    }
}

/// Reports a session's completion to the supervisor when dropped.
///
/// Held by the session task for its whole lifetime, so completion is sent
/// exactly once on every exit path, including panics and aborts.
#[derive(Debug)]
pub struct CompletionGuard {
    id: SessionId,
    tx: mpsc::UnboundedSender<SessionId>,
}

impl CompletionGuard {
    pub fn new(id: SessionId, tx: mpsc::UnboundedSender<SessionId>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        // The supervisor may already be gone during process exit
        let _ = self.tx.send(self.id);
    }
}
