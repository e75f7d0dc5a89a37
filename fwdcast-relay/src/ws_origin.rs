//! The `/ws` upgrade endpoint: where an Origin connects in, registers a
//! share, and becomes the other end of a session's duplex loop.
//!
//! Grounded on the teacher's `websocket_handler`/`handle_socket` pair in
//! `handlers/handle_websocket.rs`, but registration here is stateful up
//! front (the first frame must be `register`) rather than identity coming
//! from an `Extension<User>` set by prior middleware.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use fwdcast_protocol::Frame;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::auth;
use crate::state::AppState;

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);
const TO_ORIGIN_CHANNEL_CAPACITY: usize = 64;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let register = match await_register(&mut socket).await {
        Some(frame) => frame,
        None => return,
    };

    let Frame::Register {
        expires_at,
        password,
        ..
    } = register
    else {
        unreachable!("await_register only returns Register frames");
    };

    let Some(expires_at) = Utc.timestamp_opt(expires_at, 0).single() else {
        warn!("origin sent an unrepresentable expiresAt, closing");
        return;
    };
    if expires_at <= Utc::now() {
        warn!("origin requested an already-expired session, closing");
        return;
    }

    let password_hash = password.as_deref().map(auth::hash);
    let (to_origin_tx, to_origin_rx) = mpsc::channel(TO_ORIGIN_CHANNEL_CAPACITY);
    let session = state
        .sessions
        .create(to_origin_tx, expires_at, password_hash);

    let url = format!(
        "{}/{}/",
        state.config.effective_public_base().trim_end_matches('/'),
        session.id
    );
    let registered = Frame::Registered {
        session_id: session.id.as_str().to_string(),
        url: url.clone(),
    };
    if socket
        .send(Message::Text(registered.encode().into()))
        .await
        .is_err()
    {
        state.sessions.remove(&session.id);
        return;
    }

    info!(session = %session.id, url = %url, "session registered");
    crate::duplex::spawn(socket, session, state.sessions, to_origin_rx);
}

/// Waits for the handshake's first frame, which must be `register`. Any
/// other frame, malformed text, or a timeout closes the connection without
/// creating a session.
async fn await_register(socket: &mut WebSocket) -> Option<Frame> {
    let received = timeout(REGISTRATION_TIMEOUT, socket.recv()).await;
    let msg = match received {
        Ok(Some(Ok(msg))) => msg,
        Ok(Some(Err(err))) => {
            warn!(error = %err, "origin socket error during registration");
            return None;
        }
        Ok(None) => {
            warn!("origin closed before registering");
            return None;
        }
        Err(_) => {
            warn!("origin did not register within the handshake timeout");
            return None;
        }
    };

    let Message::Text(text) = msg else {
        warn!("origin's first frame was not text, expected register");
        return None;
    };

    match Frame::decode(&text) {
        Ok(frame @ Frame::Register { .. }) => Some(frame),
        Ok(_) => {
            warn!("origin's first frame was not a register frame");
            None
        }
        Err(err) => {
            warn!(error = %err, "origin sent a malformed register frame");
            None
        }
    }
}
