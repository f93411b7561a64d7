//! Live call sessions keyed by call id.

use callrelay_types::Session;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

/// Shared handle to one registered session.
///
/// Uses `std::sync::Mutex`: every acquisition is a single field write or read
/// and is never held across an `.await`.
pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("call already registered: {0}")]
    DuplicateCall(String),
}

/// Locks a session, recovering the data if a previous holder panicked.
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

pub trait SessionRegistry: Send + Sync {
    /// Registers a new session. Fails if the call id is already live.
    fn create(&self, session: Session) -> Result<SessionHandle, RegistryError>;

    fn lookup(&self, call_id: &str) -> Option<SessionHandle>;

    /// Removes a session. Returns `None` if it was already removed.
    fn remove(&self, call_id: &str) -> Option<SessionHandle>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local registry. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRegistry for InMemorySessionRegistry {
    fn create(&self, session: Session) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&session.call_id) {
            return Err(RegistryError::DuplicateCall(session.call_id));
        }
        let call_id = session.call_id.clone();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(call_id, handle.clone());
        Ok(handle)
    }

    fn lookup(&self, call_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(call_id)
            .cloned()
    }

    fn remove(&self, call_id: &str) -> Option<SessionHandle> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call_id)
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_duplicate_call_id() {
        let registry = InMemorySessionRegistry::new();
        registry
            .create(Session::new("CA1", "+15551234567", "Hi there"))
            .unwrap();

        let err = registry
            .create(Session::new("CA1", "+15550000000", "Other"))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateCall("CA1".to_string()));

        let handle = registry.lookup("CA1").unwrap();
        assert_eq!(lock_session(&handle).caller_number, "+15551234567");
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = InMemorySessionRegistry::new();
        registry.create(Session::new("CA1", "", "")).unwrap();

        assert!(registry.remove("CA1").is_some());
        assert!(registry.remove("CA1").is_none());
        assert!(registry.lookup("CA1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn handle_is_shared_with_registry() {
        let registry = InMemorySessionRegistry::new();
        let handle = registry.create(Session::new("CA1", "", "")).unwrap();
        lock_session(&handle).caller_number = "+15551234567".to_string();

        let looked_up = registry.lookup("CA1").unwrap();
        assert_eq!(lock_session(&looked_up).caller_number, "+15551234567");
    }
}
