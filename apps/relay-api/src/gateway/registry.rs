//! Registry of monitored broadcasters: the single source of truth for which
//! usernames have a session.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use super::events::RoomStats;
use super::session::{Session, SessionCommand, SessionSnapshot};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a session for @{username} already exists")]
    AlreadyExists { username: String, stats: RoomStats },
    #[error("no session for @{username}")]
    NotFound { username: String },
}

/// Shared registry of broadcaster sessions keyed by normalized username.
///
/// Uses `DashMap` so the presence check and the insert in [`create`] happen
/// under one shard lock: two racing starts for the same username cannot both
/// allocate a session.
///
/// [`create`]: ConnectionRegistry::create
pub struct ConnectionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    subscriber_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(subscriber_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            subscriber_capacity,
        }
    }

    /// Allocate a `Connecting` session for `username`.
    ///
    /// Returns the session and the command inbox its worker must drain.
    pub fn create(
        &self,
        username: &str,
    ) -> Result<(Arc<Session>, mpsc::Receiver<SessionCommand>), RegistryError> {
        match self.sessions.entry(username.to_string()) {
            Entry::Occupied(existing) => Err(RegistryError::AlreadyExists {
                username: username.to_string(),
                stats: existing.get().stats(),
            }),
            Entry::Vacant(slot) => {
                let (session, inbox) = Session::new(username, self.subscriber_capacity);
                slot.insert(session.clone());
                Ok((session, inbox))
            }
        }
    }

    pub fn get(&self, username: &str) -> Result<Arc<Session>, RegistryError> {
        self.sessions
            .get(username)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound {
                username: username.to_string(),
            })
    }

    pub fn contains(&self, username: &str) -> bool {
        self.sessions.contains_key(username)
    }

    /// Drop the session for `username` and ask its worker to dispose the adapter.
    ///
    /// Idempotent: removing an absent username is a no-op returning `None`.
    pub fn remove(&self, username: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(username)?;
        if !session.request_stop(None) {
            tracing::debug!(%username, "session worker already gone at removal");
        }
        Some(session)
    }

    /// Remove `session` only if it is still the registered entry for its username.
    ///
    /// Used by a worker tearing itself down, so a stale worker never evicts a
    /// newer session started under the same name.
    pub fn remove_session(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .remove_if(session.username(), |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Lazily produce a status snapshot of every session.
    pub fn list_all(&self) -> impl Iterator<Item = SessionSnapshot> + '_ {
        self.sessions.iter().map(|entry| entry.value().snapshot())
    }

    pub fn usernames(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::session::ConnectionState;

    #[test]
    fn create_twice_keeps_one_session_and_reports_first_stats() {
        let registry = ConnectionRegistry::new(8);
        let (first, _inbox) = registry.create("alice").unwrap();
        first.update_stats(|s| s.viewer_count = 77);

        let err = registry.create("alice").unwrap_err();
        match err {
            RegistryError::AlreadyExists { username, stats } => {
                assert_eq!(username, "alice");
                assert_eq!(stats.viewer_count, 77);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get("alice").unwrap(), &first));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let registry = ConnectionRegistry::new(8);
        assert!(matches!(
            registry.get("ghost"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_signals_worker() {
        let registry = ConnectionRegistry::new(8);
        let (_session, mut inbox) = registry.create("alice").unwrap();

        assert!(registry.remove("alice").is_some());
        assert!(matches!(
            inbox.recv().await,
            Some(SessionCommand::Stop { .. })
        ));

        assert!(registry.remove("alice").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_session_ignores_newer_session_with_same_name() {
        let registry = ConnectionRegistry::new(8);
        let (old, _old_inbox) = registry.create("alice").unwrap();
        registry.remove("alice");
        let (new, _new_inbox) = registry.create("alice").unwrap();

        assert!(!registry.remove_session(&old));
        assert!(registry.contains("alice"));
        assert!(registry.remove_session(&new));
        assert!(!registry.contains("alice"));
    }

    #[test]
    fn list_all_reports_each_session() {
        let registry = ConnectionRegistry::new(8);
        let (a, _ia) = registry.create("a").unwrap();
        let (_b, _ib) = registry.create("b").unwrap();
        a.set_connection_state(ConnectionState::Live);

        let mut snaps: Vec<_> = registry.list_all().collect();
        snaps.sort_by(|x, y| x.username.cmp(&y.username));
        assert_eq!(snaps.len(), 2);
        assert!(snaps[0].is_connected);
        assert_eq!(snaps[1].state, ConnectionState::Connecting);
    }
}
