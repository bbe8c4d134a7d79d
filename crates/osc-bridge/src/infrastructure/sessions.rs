//! Registry of live WebSocket sessions and their outbound queues.
//!
//! Each session owns a bounded `mpsc` queue.  The registry only holds the
//! sending side; the session task drains the receiver into its WebSocket.
//! Broadcasting uses `try_send`, so one slow or dead client costs the OSC
//! ingest path nothing but a dropped message for that client.

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::{BroadcastReport, SessionBroadcaster};

/// Why a frame could not be queued for a session.
///
/// Always scoped to the one session named in the error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionSendError {
    #[error("session {id} outbound queue is full")]
    QueueFull { id: Uuid },

    #[error("session {id} is closed")]
    Closed { id: Uuid },

    #[error("no session with id {0}")]
    UnknownSession(Uuid),
}

struct SessionEntry {
    peer: SocketAddr,
    tx: mpsc::Sender<String>,
}

/// All currently registered WebSocket sessions.
///
/// Safe to share via `Arc` and to use from any task.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session and returns its id and the receiving end of its queue.
    pub async fn register(&self, peer: SocketAddr, capacity: usize) -> (Uuid, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .insert(id, SessionEntry { peer, tx });
        debug!("session {id} registered for {peer}");
        (id, rx)
    }

    /// Removes a session.  Returns `false` if it was already gone.
    pub async fn unregister(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        if let Some(entry) = &removed {
            debug!("session {id} ({}) unregistered", entry.peer);
        }
        removed.is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Queues `text` for one session without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SessionSendError`] if the session is unknown, its queue is
    /// full, or its task has gone away.
    pub async fn send_to(&self, id: Uuid, text: String) -> Result<(), SessionSendError> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(&id)
            .ok_or(SessionSendError::UnknownSession(id))?;
        try_queue(id, &entry.tx, text)
    }

    /// Drops every queue sender, which ends each session's writer loop, and
    /// empties the registry.
    pub async fn close_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let n = sessions.len();
        sessions.clear();
        n
    }
}

fn try_queue(id: Uuid, tx: &mpsc::Sender<String>, text: String) -> Result<(), SessionSendError> {
    tx.try_send(text).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => SessionSendError::QueueFull { id },
        mpsc::error::TrySendError::Closed(_) => SessionSendError::Closed { id },
    })
}

#[async_trait]
impl SessionBroadcaster for SessionRegistry {
    async fn broadcast(&self, text: &str) -> BroadcastReport {
        let sessions = self.sessions.read().await;
        let mut report = BroadcastReport::default();
        for (id, entry) in sessions.iter() {
            match try_queue(*id, &entry.tx, text.to_owned()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("dropping message for {}: {e}", entry.peer);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
