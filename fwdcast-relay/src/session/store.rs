use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fwdcast_protocol::Frame;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::types::{Session, SessionId};

/// Generalizes the teacher's `ConnectionManager`
/// (`infra/websocket/manager.rs`) from WebSocket connections to fwdcast
/// sessions: a DashMap keyed by opaque ID, with a mapping-level lock
/// (DashMap's own sharded locking) kept strictly separate from each
/// session's own interior mutex.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Allocate a session with a fresh CSPRNG-generated ID, retrying on the
    /// astronomically rare collision. Never blocks on I/O.
    pub fn create(
        &self,
        to_origin: mpsc::Sender<Frame>,
        expires_at: DateTime<Utc>,
        password_hash: Option<String>,
    ) -> Arc<Session> {
        loop {
            let id = SessionId::generate();
            if self.sessions.contains_key(&id) {
                continue;
            }
            let session = Arc::new(Session::new(
                id.clone(),
                to_origin,
                expires_at,
                password_hash,
            ));
            self.sessions.insert(id, session.clone());
            return session;
        }
    }

    /// Returns the live session, evicting and returning `None` if it has
    /// expired since the last check.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|s| s.clone())?;
        if session.is_expired(Utc::now()) {
            self.remove(id);
            return None;
        }
        Some(session)
    }

    /// Fires `done` on every pending request, then deletes the session.
    /// Idempotent.
    pub fn remove(&self, id: &SessionId) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.abort_all_pending();
            debug!(session = %id, "session removed");
        }
    }

    /// Best-effort sends `expired` over the channel, then removes the
    /// session. Never blocks on other sessions: each expiry is independent.
    pub async fn expire(&self, id: &SessionId) {
        if let Some(session) = self.sessions.get(id).map(|s| s.clone()) {
            if session.to_origin.send(Frame::Expired {}).await.is_err() {
                warn!(session = %id, "could not deliver expired frame, origin already gone");
            }
        }
        self.remove(id);
    }

    /// IDs whose `expires_at` has already elapsed, snapshotted without
    /// holding any lock while the caller acts on them.
    pub fn expired_ids(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// All currently-registered session IDs, snapshotted the same way as
    /// `expired_ids`.
    pub fn all_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Expires every session, per `spec.md` §4.6's external-shutdown
    /// termination cause: every Origin gets an `expired` frame and every
    /// session is torn down, the same as a natural expiry.
    pub async fn expire_all(&self) {
        for id in self.all_ids() {
            self.expire(&id).await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
