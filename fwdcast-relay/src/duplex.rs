//! The per-session duplex loop bridging an Origin's WebSocket connection to
//! the viewers currently waiting on it.
//!
//! Grounded on the teacher's `handlers/handle_websocket.rs::handle_socket`:
//! a split socket, an outgoing forwarder task draining an `mpsc` channel,
//! and an incoming dispatch loop. The domain dispatch (`response`/`data`/
//! `end`) is new — the teacher's socket handler fans a `SyncMessage` out to
//! a room, while this one routes by `PendingRequest` ID within one session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use fwdcast_protocol::Frame;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::{Session, SessionStore, ViewerEvent};

/// Spawns the reader and writer halves for one Origin connection. Returns
/// once the socket is split; both halves run to completion independently
/// and the reader half removes the session from `store` on exit.
pub fn spawn(socket: WebSocket, session: Arc<Session>, store: SessionStore, to_origin_rx: mpsc::Receiver<Frame>) {
    let (ws_sender, ws_receiver) = socket.split();

    tokio::spawn(forward_to_origin(ws_sender, to_origin_rx));
    tokio::spawn(read_from_origin(ws_receiver, session, store));
}

/// Single-writer actor draining frames destined for the Origin. Mirrors the
/// teacher's outgoing-message task: one `mpsc::Receiver`, one socket sender,
/// exit silently when either side closes.
async fn forward_to_origin(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
) {
    while let Some(frame) = rx.recv().await {
        let text = frame.encode();
        if ws_sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

/// Reads frames from the Origin and dispatches them to the session's
/// pending viewer requests, per the response/data/end table. On read error
/// or EOF the session is torn down, which fires `done` on every request
/// still waiting.
async fn read_from_origin(
    mut ws_receiver: futures_util::stream::SplitStream<WebSocket>,
    session: Arc<Session>,
    store: SessionStore,
) {
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match Frame::decode(&text) {
                Ok(frame) => dispatch(frame, &session).await,
                Err(err) => warn!(session = %session.id, error = %err, "dropping malformed frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(session = %session.id, error = %err, "origin socket error");
                break;
            }
        }
    }
    store.remove(&session.id);
}

async fn dispatch(frame: Frame, session: &Session) {
    match frame {
        Frame::Response { id, status, headers } => {
            let writer = session.with_pending(&id, |p| p.writer.clone());
            match writer {
                Some(writer) => {
                    if writer
                        .send(ViewerEvent::Headers { status, headers })
                        .await
                        .is_err()
                    {
                        debug!(request = %id, "viewer sink closed before headers were delivered");
                    }
                }
                None => debug!(request = %id, "response for unknown or already-finished request"),
            }
        }
        Frame::Data { ref id, .. } => {
            let id = id.clone();
            let decoded = frame.decode_chunk();
            let bytes = match decoded {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => {
                    warn!(request = %id, error = %err, "dropping data frame with invalid chunk encoding");
                    return;
                }
                None => return,
            };
            match session.with_pending(&id, |p| p.writer.clone()) {
                Some(writer) => {
                    if writer.send(ViewerEvent::Data(bytes)).await.is_err() {
                        debug!(request = %id, "viewer disconnected mid-stream");
                    }
                }
                None => debug!(request = %id, "data for unknown or already-finished request"),
            }
        }
        Frame::End { id } => match session.remove_pending(&id) {
            Some(pending) => pending.fire_done(),
            None => debug!(request = %id, "end for unknown or already-finished request"),
        },
        other => debug!(frame = ?other, "unexpected frame type from origin, ignoring"),
    }
}
