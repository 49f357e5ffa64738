//! The server's concurrent directory of established sessions: the single
//! source of truth for "who is reachable now". A session id appears here if
//! and only if its handshake completed and teardown has not yet removed it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use veilnet_types::proto::SessionId;

use crate::error::NetworkError;
use crate::proto::session::ClientSession;

define_outer_struct_wrapper!(SessionManager, SessionManagerInner);

/// Used for handling stateful connections between the server and its peers
#[derive(Default)]
pub struct SessionManagerInner {
    sessions: HashMap<SessionId, ClientSession>,
}

impl SessionManager {
    /// Creates a new [`SessionManager`] which tracks individual connections
    pub fn new() -> Self {
        Self::from(SessionManagerInner::default())
    }

    /// Makes a freshly handshaked session routable. This is the only point a
    /// session enters the directory; a duplicate id is refused so at most one
    /// live entry exists per identifier.
    pub fn register_session(&self, session: ClientSession) -> Result<(), NetworkError> {
        let mut this = inner_mut!(self);
        match this.sessions.entry(session.session_id().clone()) {
            Entry::Occupied(_) => Err(NetworkError::InternalError(
                "session id already registered",
            )),
            Entry::Vacant(slot) => {
                let _ = slot.insert(session);
                Ok(())
            }
        }
    }

    /// Removes a session from the directory, if present
    pub fn clear_session(&self, session_id: &SessionId) -> Option<ClientSession> {
        let mut this = inner_mut!(self);
        this.sessions.remove(session_id)
    }

    /// Looks up a routable session by identifier
    pub fn get_session(&self, session_id: &SessionId) -> Option<ClientSession> {
        let this = inner!(self);
        this.sessions.get(session_id).cloned()
    }

    /// Determines if `session_id` is connected
    pub fn session_active(&self, session_id: &SessionId) -> bool {
        let this = inner!(self);
        this.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        let this = inner!(self);
        this.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let this = inner!(self);
        this.sessions.keys().cloned().collect()
    }

    /// Snapshot of every live session, e.g. for shutdown fan-out
    pub fn sessions(&self) -> Vec<ClientSession> {
        let this = inner!(self);
        this.sessions.values().cloned().collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilnet_ledger::records::ConnectionRecordId;

    fn mock_session(id: &str) -> ClientSession {
        ClientSession::mock(SessionId::from(id), [0u8; 32], ConnectionRecordId(1)).0
    }

    #[test]
    fn register_lookup_clear() {
        let manager = SessionManager::new();
        assert_eq!(manager.session_count(), 0);

        manager.register_session(mock_session("alpha")).unwrap();
        assert!(manager.session_active(&SessionId::from("alpha")));
        assert!(manager.get_session(&SessionId::from("alpha")).is_some());
        assert!(manager.get_session(&SessionId::from("beta")).is_none());

        assert!(manager.clear_session(&SessionId::from("alpha")).is_some());
        assert!(!manager.session_active(&SessionId::from("alpha")));
        assert!(manager.clear_session(&SessionId::from("alpha")).is_none());
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let manager = SessionManager::new();
        manager.register_session(mock_session("alpha")).unwrap();
        assert!(manager.register_session(mock_session("alpha")).is_err());
        assert_eq!(manager.session_count(), 1);
    }

    #[test]
    fn concurrent_registration_and_removal_balance() {
        const REGISTERED: usize = 64;
        const REMOVED: usize = 24;

        let manager = SessionManager::new();

        std::thread::scope(|scope| {
            for worker in 0..REGISTERED {
                let manager = manager.clone();
                let _ = scope.spawn(move || {
                    manager
                        .register_session(mock_session(&format!("session-{worker}")))
                        .unwrap();
                });
            }
        });

        assert_eq!(manager.session_count(), REGISTERED);

        std::thread::scope(|scope| {
            for worker in 0..REMOVED {
                let manager = manager.clone();
                let _ = scope.spawn(move || {
                    assert!(manager
                        .clear_session(&SessionId::from(format!("session-{worker}").as_str()))
                        .is_some());
                });
            }
        });

        assert_eq!(manager.session_count(), REGISTERED - REMOVED);

        let mut ids = manager.session_ids();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), REGISTERED - REMOVED);
    }
}
