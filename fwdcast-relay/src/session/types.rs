use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fwdcast_protocol::Frame;
use parking_lot::Mutex;
use rand::RngCore;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// A session's opaque public identifier: 12 lowercase hex characters from
/// 6 CSPRNG bytes, per `spec.md` §6's session ID format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex_encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 12 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A viewer-scoped request identifier, unique within a session.
pub type RequestId = String;

pub fn generate_request_id() -> RequestId {
    Uuid::new_v4().to_string()
}

/// A chunk of a streamed viewer response, handed from the duplex loop to
/// the viewer's HTTP response body.
#[derive(Debug)]
pub enum ViewerEvent {
    Headers {
        status: u16,
        headers: HashMap<String, String>,
    },
    Data(Vec<u8>),
}

/// A viewer HTTP request awaiting a response from the Origin.
///
/// `writer` streams response chunks out to the viewer's HTTP body; `done`
/// fires exactly once, on `end` from the Origin or on timeout/cancellation,
/// per `spec.md` §3.
pub struct PendingRequest {
    pub writer: mpsc::Sender<ViewerEvent>,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

impl PendingRequest {
    pub fn new(writer: mpsc::Sender<ViewerEvent>, done: oneshot::Sender<()>) -> Self {
        Self {
            writer,
            done: Mutex::new(Some(done)),
        }
    }

    /// Fire the `done` signal. Idempotent — a second call is a no-op, since
    /// the oneshot sender is only ever held once.
    pub fn fire_done(&self) {
        if let Some(tx) = self.done.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Outcome of a viewer admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerAdmission {
    Admitted,
    NotFound,
    MaxReached,
}

pub(super) struct SessionInner {
    pub viewer_count: usize,
    pub pending: HashMap<RequestId, PendingRequest>,
    pub password_hash: Option<String>,
    pub auth_token: String,
    pub failed_auth_attempts: Vec<Instant>,
}

/// An active Origin↔Relay binding, per `spec.md` §3.
pub struct Session {
    pub id: SessionId,
    pub to_origin: mpsc::Sender<Frame>,
    pub expires_at: DateTime<Utc>,
    pub max_viewers: usize,
    pub(super) inner: Mutex<SessionInner>,
}

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(30);
const RATE_LIMIT_THRESHOLD: usize = 5;

impl Session {
    pub fn new(
        id: SessionId,
        to_origin: mpsc::Sender<Frame>,
        expires_at: DateTime<Utc>,
        password_hash: Option<String>,
    ) -> Self {
        Self {
            id,
            to_origin,
            expires_at,
            max_viewers: 3,
            inner: Mutex::new(SessionInner {
                viewer_count: 0,
                pending: HashMap::new(),
                password_hash,
                auth_token: generate_auth_token(),
                failed_auth_attempts: Vec::new(),
            }),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn requires_auth(&self) -> bool {
        self.inner.lock().password_hash.is_some()
    }

    pub fn auth_token(&self) -> String {
        self.inner.lock().auth_token.clone()
    }

    pub fn check_cookie(&self, token: &str) -> bool {
        self.inner.lock().auth_token == token
    }

    pub fn verify_password(&self, password: &str) -> bool {
        match &self.inner.lock().password_hash {
            Some(hash) => crate::auth::verify(password, hash),
            None => true,
        }
    }

    /// Records a failed login attempt and returns whether the caller has now
    /// tripped the 5-failures-in-30-seconds rate limit.
    pub fn record_failed_auth(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner
            .failed_auth_attempts
            .retain(|t| now.duration_since(*t) < RATE_LIMIT_WINDOW);
        inner.failed_auth_attempts.push(now);
        inner.failed_auth_attempts.len() >= RATE_LIMIT_THRESHOLD
    }

    pub fn is_rate_limited(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner
            .failed_auth_attempts
            .retain(|t| now.duration_since(*t) < RATE_LIMIT_WINDOW);
        inner.failed_auth_attempts.len() >= RATE_LIMIT_THRESHOLD
    }

    pub fn increment_viewers(&self) -> ViewerAdmission {
        let mut inner = self.inner.lock();
        if inner.viewer_count >= self.max_viewers {
            ViewerAdmission::MaxReached
        } else {
            inner.viewer_count += 1;
            ViewerAdmission::Admitted
        }
    }

    pub fn decrement_viewers(&self) {
        let mut inner = self.inner.lock();
        if inner.viewer_count > 0 {
            inner.viewer_count -= 1;
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.lock().viewer_count
    }

    pub fn add_pending(&self, id: RequestId, req: PendingRequest) {
        self.inner.lock().pending.insert(id, req);
    }

    pub fn remove_pending(&self, id: &str) -> Option<PendingRequest> {
        self.inner.lock().pending.remove(id)
    }

    pub fn with_pending<R>(&self, id: &str, f: impl FnOnce(&PendingRequest) -> R) -> Option<R> {
        self.inner.lock().pending.get(id).map(f)
    }

    /// Fires `done` on every pending request and clears them, per the
    /// "session destruction ⇒ every pending request's `done` fires" invariant.
    pub fn abort_all_pending(&self) {
        let pending = std::mem::take(&mut self.inner.lock().pending);
        for (_, req) in pending {
            req.fire_done();
        }
    }
}

fn generate_auth_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}
