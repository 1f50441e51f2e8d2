//! In-memory record of open sessions
//!
//! Every operation takes the lock once, so callers observe either the
//! state before or after an update, never an intermediate one.

use std::collections::HashMap;

use parking_lot::Mutex;

use stackdeck_protocol::{Geometry, SessionId};

use super::{Session, SessionState};

/// Authoritative map from session id to session and geometry
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, replacing any previous entry with the same id
    pub fn insert(&self, session: Session) {
        self.sessions.lock().insert(session.id(), session);
    }

    /// Snapshot of a session
    pub fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.lock().get(&session_id).cloned()
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.lock().contains_key(&session_id)
    }

    pub fn state(&self, session_id: SessionId) -> Option<SessionState> {
        self.sessions
            .lock()
            .get(&session_id)
            .map(|s| s.state().clone())
    }

    /// Last geometry sent to the host for this session
    pub fn geometry(&self, session_id: SessionId) -> Option<Geometry> {
        self.sessions
            .lock()
            .get(&session_id)
            .and_then(|s| s.geometry())
    }

    /// Apply `f` to a session under the registry lock
    pub fn update<R>(&self, session_id: SessionId, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.lock().get_mut(&session_id).map(f)
    }

    /// Remove a session, returning it marked `Closed`
    pub fn remove(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.lock().remove(&session_id).map(|mut session| {
            session.set_state(SessionState::Closed);
            session
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Ids of all sessions, oldest first
    pub fn session_ids(&self) -> Vec<SessionId> {
        let sessions = self.sessions.lock();
        let mut entries: Vec<&Session> = sessions.values().collect();
        entries.sort_by_key(|s| s.created_at());
        entries.into_iter().map(|s| s.id()).collect()
    }
}
