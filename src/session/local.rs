//! Replica-local session store
//!
//! A single map guarded by a reader-writer lock. Register/unregister are
//! rare relative to lookups, so readers stay cheap.

use crate::error::{GatewayError, Result};
use crate::session::{
    conflicting_session, PushOutcome, SessionConnection, SessionMessage, SessionMeta,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// In-process session store
pub struct LocalSessionStore {
    connections: RwLock<HashMap<String, Arc<SessionConnection>>>,
}

impl LocalSessionStore {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, meta: SessionMeta) -> Result<Arc<SessionConnection>> {
        let mut connections = self.connections.write().unwrap();
        if let Some(existing) = connections.get(&meta.id) {
            if existing.meta().matches(&meta) {
                return Ok(Arc::clone(existing));
            }
            return Err(conflicting_session(&meta.id));
        }

        let connection = SessionConnection::new(meta.clone());
        connections.insert(meta.id.clone(), Arc::clone(&connection));
        info!("Registered session {} on prefix {}", meta.id, meta.prefix);
        Ok(connection)
    }

    pub fn get(&self, id: &str) -> Result<Arc<SessionConnection>> {
        let connections = self.connections.read().unwrap();
        connections
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::session_not_found(id))
    }

    pub fn unregister(&self, id: &str) -> Result<()> {
        let removed = self.connections.write().unwrap().remove(id);
        if let Some(connection) = removed {
            connection.close();
            info!("Unregistered session {}", id);
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<Arc<SessionConnection>> {
        self.connections.read().unwrap().values().cloned().collect()
    }

    pub fn send(
        &self,
        connection: &Arc<SessionConnection>,
        message: SessionMessage,
    ) -> Result<()> {
        let event = message.event.clone();
        match connection.push(message) {
            PushOutcome::Delivered => Ok(()),
            PushOutcome::Dropped => {
                warn!(
                    "Session {} queue is full, dropping '{}' event",
                    connection.meta().id,
                    event
                );
                Ok(())
            }
            PushOutcome::Closed => Err(GatewayError::session_not_found(&connection.meta().id)),
        }
    }
}

impl Default for LocalSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent_on_identical_meta() {
        let store = LocalSessionStore::new();
        let meta = SessionMeta::streamable("s1", "/svc");
        let first = store.register(meta.clone()).unwrap();
        assert_eq!(
            first.push(SessionMessage::message("queued")),
            PushOutcome::Delivered
        );

        let second = store.register(meta).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // The queue was not reset by re-registration.
        let mut rx = second.take_receiver().unwrap();
        assert_eq!(rx.try_recv().unwrap().data, "queued");
    }

    #[test]
    fn test_register_conflicts_on_different_meta() {
        let store = LocalSessionStore::new();
        store.register(SessionMeta::streamable("s1", "/a")).unwrap();
        let err = store
            .register(SessionMeta::streamable("s1", "/b"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict { .. }));
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = LocalSessionStore::new();
        assert!(matches!(
            store.get("ghost").unwrap_err(),
            GatewayError::SessionNotFound { .. }
        ));
    }

    #[test]
    fn test_unregister_closes_and_is_idempotent() {
        let store = LocalSessionStore::new();
        let conn = store.register(SessionMeta::streamable("s1", "/")).unwrap();
        store.unregister("s1").unwrap();
        assert!(conn.is_closed());
        assert!(store.get("s1").is_err());
        // A second unregister is a no-op.
        store.unregister("s1").unwrap();
    }
}
