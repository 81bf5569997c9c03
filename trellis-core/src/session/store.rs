//! Registry of live sessions.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Session, SessionKind, Transport};
use crate::protocol::ServerMessage;

/// Durable sessions by id. Safe to share between connection tasks.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a durable session for a new connection.
    pub fn open(&self, transport: Arc<dyn Transport>) -> Session {
        let session = Session::durable(transport);
        self.sessions.insert(session.id(), session.clone());
        info!(session = %session.id(), live = self.sessions.len(), "session opened");
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Remove and dispose a session. Returns whether it was registered.
    pub fn close(&self, id: &Uuid) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.dispose();
                info!(session = %id, live = self.sessions.len(), "session closed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Send `message` to every durable session. Returns how many accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        // Collect first so no shard lock is held while sending.
        let sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|entry| entry.kind() == SessionKind::Durable)
            .map(|entry| entry.value().clone())
            .collect();

        sessions
            .iter()
            .filter(|session| match session.send(message) {
                Ok(()) => true,
                Err(error) => {
                    warn!(session = %session.id(), %error, "broadcast failed");
                    false
                }
            })
            .count()
    }

    /// Dispose every session.
    pub fn clear(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.close(&id);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
