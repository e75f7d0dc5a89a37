//! Outbound WebSocket connection to a relay.
//!
//! Grounded directly on `UplinkSession::connect` in
//! `services/forwarder/src/uplink.rs`: `connect_async` over an
//! `IntoClientRequest`-built request, a hello-then-ack handshake, and a
//! receive loop that answers pings. `ForwarderHello`/`Heartbeat` become
//! `Frame::Register`/`Frame::Registered`.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use fwdcast_protocol::Frame;

use crate::error::{OriginError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A registered connection to a relay: the handshake has already completed
/// and `session_id`/`url` are known.
pub struct RelaySession {
    ws: WsStream,
    pub session_id: String,
    pub url: String,
}

/// Dial the relay and perform the register/registered handshake. Returns
/// `OriginError::UnexpectedDuringRegistration` if the relay replies with
/// anything other than `registered`.
pub async fn connect(
    relay_url: &str,
    share_path: &str,
    duration_minutes: u32,
    password: Option<String>,
) -> Result<RelaySession> {
    let request = relay_url
        .into_client_request()
        .map_err(|e| OriginError::InvalidUrl(format!("{relay_url}: {e}")))?;

    let (mut ws, _response) = connect_async(request).await?;

    let expires_at = Utc::now() + chrono::Duration::minutes(i64::from(duration_minutes));
    let register = Frame::Register {
        path: share_path.to_string(),
        expires_at: expires_at.timestamp(),
        password,
    };
    ws.send(Message::Text(register.encode().into())).await?;

    loop {
        let msg = ws.next().await.ok_or(OriginError::RegistrationFailed)??;
        match msg {
            Message::Text(text) => {
                let frame = Frame::decode(&text)?;
                match frame {
                    Frame::Registered { session_id, url } => {
                        return Ok(RelaySession {
                            ws,
                            session_id,
                            url,
                        });
                    }
                    other => {
                        return Err(OriginError::UnexpectedDuringRegistration(format!(
                            "{other:?}"
                        )));
                    }
                }
            }
            Message::Ping(data) => {
                let _ = ws.send(Message::Pong(data)).await;
            }
            Message::Close(_) => return Err(OriginError::RegistrationFailed),
            _ => continue,
        }
    }
}

/// Outgoing traffic to the relay: application frames and the pongs the
/// reader side needs written back on the same socket.
pub enum Outbound {
    Frame(Frame),
    Pong(Vec<u8>),
}

impl RelaySession {
    /// Splits into a reader (with a sender it uses to route pongs back
    /// through the writer loop, since a split sink/stream pair can't both
    /// be owned by the reader task) and a writer loop future that drains
    /// both application frames and pongs onto the socket.
    pub fn split(self) -> (RelayReader, mpsc::Sender<Outbound>, WriterLoop) {
        let (sink, stream) = self.ws.split();
        let (tx, rx) = mpsc::channel(64);
        (
            RelayReader {
                stream,
                pong_tx: tx.clone(),
            },
            tx,
            WriterLoop { sink, rx },
        )
    }
}

pub struct RelayReader {
    stream: futures_util::stream::SplitStream<WsStream>,
    pong_tx: mpsc::Sender<Outbound>,
}

impl RelayReader {
    /// Reads the next application frame, transparently answering pings by
    /// routing a pong through the writer loop. Returns `None` on close/EOF.
    pub async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Frame::decode(&text).map_err(Into::into)),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(data)) => {
                    let _ = self.pong_tx.send(Outbound::Pong(data.into())).await;
                    continue;
                }
                Ok(Message::Pong(_)) => continue,
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

/// Drains `Outbound` items onto the socket until the channel closes or a
/// send fails. Meant to be `tokio::spawn`ed once per session.
pub struct WriterLoop {
    sink: futures_util::stream::SplitSink<WsStream, Message>,
    rx: mpsc::Receiver<Outbound>,
}

impl WriterLoop {
    pub async fn run(mut self) {
        while let Some(item) = self.rx.recv().await {
            let message = match item {
                Outbound::Frame(frame) => Message::Text(frame.encode().into()),
                Outbound::Pong(data) => Message::Pong(data.into()),
            };
            if self.sink.send(message).await.is_err() {
                break;
            }
        }
        debug!("relay writer loop exiting");
    }
}
