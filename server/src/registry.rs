//! Session lifecycle tracking for the relay.
//!
//! The registry is the source of truth for membership: a peer is "still
//! playing" exactly as long as its session is registered here, regardless
//! of socket liveness. It is owned behind one `Arc<RwLock>` handle shared
//! by the bootstrap handlers and the disconnect path; nothing else
//! mutates sessions.

use log::info;
use shared::Session;
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already registered; the caller should generate a fresh one.
    #[error("session {0} is already registered")]
    DuplicateSession(String),
    #[error("unknown session {0}")]
    UnknownSession(String),
    #[error("session limit {0} reached")]
    RegistryFull(usize),
}

fn now_utc() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Tracks which session identifiers are currently connected.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
        }
    }

    /// Registers a new session. Fails with [`RegistryError::RegistryFull`]
    /// at capacity, or [`RegistryError::DuplicateSession`] if the id is
    /// taken; for the latter, callers generate a fresh identifier and retry.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Session, RegistryError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(RegistryError::RegistryFull(self.max_sessions));
        }

        let id = id.into();
        if self.sessions.contains_key(&id) {
            return Err(RegistryError::DuplicateSession(id));
        }

        let session = Session {
            id: id.clone(),
            display_name: display_name.into(),
            last_activity: now_utc(),
        };
        info!("Session {} ({}) joined", session.id, session.display_name);
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    /// Refreshes the session's last-activity timestamp.
    pub fn touch(&mut self, id: &str) -> Result<Session, RegistryError> {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.last_activity = now_utc();
                Ok(session.clone())
            }
            None => Err(RegistryError::UnknownSession(id.to_string())),
        }
    }

    /// Removes a session and returns its record.
    ///
    /// When an explicit leave and a transport disconnect race for the same
    /// id, only the first call removes; call sites treat the resulting
    /// [`RegistryError::UnknownSession`] as a quiet no-op, which is what
    /// makes removal idempotent end to end.
    pub fn remove(&mut self, id: &str) -> Result<Session, RegistryError> {
        match self.sessions.remove(id) {
            Some(session) => {
                info!("Session {} ({}) left", session.id, session.display_name);
                Ok(session)
            }
            None => Err(RegistryError::UnknownSession(id.to_string())),
        }
    }

    /// Membership snapshot for reconciliation cleanup.
    pub fn list_active(&self) -> HashSet<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
