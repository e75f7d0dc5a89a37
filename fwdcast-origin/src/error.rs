use thiserror::Error;

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] fwdcast_protocol::ProtocolError),

    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),

    #[error("relay closed the connection before registration completed")]
    RegistrationFailed,

    #[error("relay sent an unexpected frame during registration: {0}")]
    UnexpectedDuringRegistration(String),

    #[error("requested path escapes the shared directory")]
    PathTraversal,

    #[error("exhausted {0} connection attempts")]
    RetriesExhausted(u32),
}

pub type Result<T> = std::result::Result<T, OriginError>;
