//! The authoritative map from connection identity to session record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use enface_core::{ConnectionId, SessionId};
use parking_lot::{Mutex, MutexGuard};
use tokio::task::AbortHandle;

use crate::reaper;
use crate::resolver::{Connection, PendingReply};

/// Correlation record for one handshake.
pub struct Session {
    pub(crate) connection_id: ConnectionId,
    pub(crate) session_id: SessionId,
    pub(crate) activated: bool,
    pub(crate) pending: Option<PendingReply>,
    pub(crate) connection: Option<Box<dyn Connection>>,
    reaper: Option<AbortHandle>,
}

impl Session {
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            connection_id: self.connection_id.clone(),
            session_id: self.session_id.clone(),
            activated: self.activated,
            pending: self.pending.is_some(),
        }
    }

    /// Cancel the TTL timer and close the owned connection, if any. An unused
    /// pending reply is dropped, which the transport observes as a close.
    fn shutdown(mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
        drop(self.pending.take());
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "failed to close connection"
                );
            }
        }
    }
}

/// Read-only snapshot of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub connection_id: ConnectionId,
    pub session_id: SessionId,
    pub activated: bool,
    /// Whether a connection is parked waiting for this session's outcome.
    pub pending: bool,
}

/// All live sessions, keyed by the connection that currently owns them.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, Session>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Register a session for `connection_id` with a fresh session id and arm
    /// its TTL. Must be called from within a tokio runtime.
    pub fn create(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        pending: Option<PendingReply>,
        connection: Option<Box<dyn Connection>>,
    ) -> SessionInfo {
        let mut sessions = self.lock();
        let mut session_id = SessionId::new();
        while sessions.find_by_session_id(&session_id).is_some() {
            session_id = SessionId::new();
        }

        let session = Session {
            connection_id: connection_id.clone(),
            session_id: session_id.clone(),
            activated: false,
            pending,
            connection,
            reaper: Some(reaper::arm(
                Arc::downgrade(self),
                connection_id.clone(),
                session_id,
                self.ttl,
            )),
        };
        let info = session.info();
        let replaced = sessions.insert(session);
        drop(sessions);

        if let Some(old) = replaced {
            tracing::warn!(connection_id = %connection_id, "replaced live session for reused connection id");
            old.shutdown();
        }
        tracing::debug!(connection_id = %info.connection_id, session_id = %info.session_id, "session created");
        info
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<SessionInfo> {
        self.lock().get(connection_id).map(Session::info)
    }

    pub fn find_by_session_id(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.lock().find_by_session_id(session_id).map(Session::info)
    }

    /// Remove a session, closing its connection. Returns whether it existed.
    pub fn remove(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.lock().detach(connection_id);
        match removed {
            Some(session) => {
                tracing::debug!(connection_id = %connection_id, session_id = %session.session_id, "session removed");
                session.shutdown();
                true
            }
            None => false,
        }
    }

    /// Remove the session only if `connection_id` still maps to the session
    /// instance identified by `session_id`.
    pub(crate) fn expire(&self, connection_id: &ConnectionId, session_id: &SessionId) -> bool {
        let mut sessions = self.lock();
        let current = sessions
            .get(connection_id)
            .is_some_and(|s| &s.session_id == session_id);
        if !current {
            return false;
        }
        let removed = sessions.detach(connection_id);
        drop(sessions);
        removed.map(Session::shutdown).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exclusive access for multi-step lookup/mutate sequences.
    pub(crate) fn lock(&self) -> Sessions<'_> {
        Sessions {
            map: self.sessions.lock(),
        }
    }

    /// Shut down sessions taken out under a lock. Call after the lock is released.
    pub(crate) fn finalize(sessions: Vec<Session>) {
        for session in sessions {
            tracing::debug!(
                connection_id = %session.connection_id,
                session_id = %session.session_id,
                "session finalized"
            );
            session.shutdown();
        }
    }
}

/// Locked view of the registry.
pub(crate) struct Sessions<'a> {
    map: MutexGuard<'a, HashMap<ConnectionId, Session>>,
}

impl Sessions<'_> {
    pub(crate) fn get(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.map.get(connection_id)
    }

    pub(crate) fn get_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Session> {
        self.map.get_mut(connection_id)
    }

    pub(crate) fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.map.contains_key(connection_id)
    }

    // Linear scan; concurrent handshakes number in the hundreds at most.
    pub(crate) fn find_by_session_id(&self, session_id: &SessionId) -> Option<&Session> {
        self.map.values().find(|s| &s.session_id == session_id)
    }

    pub(crate) fn find_by_session_id_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.map.values_mut().find(|s| &s.session_id == session_id)
    }

    /// Take a session out of the registry without shutting it down.
    pub(crate) fn detach(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        self.map.remove(connection_id)
    }

    fn insert(&mut self, session: Session) -> Option<Session> {
        self.map.insert(session.connection_id.clone(), session)
    }
}
