use thiserror::Error;

/// Failures that can occur while decoding a wire frame.
///
/// Every variant maps back to the "fail with `invalid message`" directive
/// from the protocol specification; the variants themselves exist so callers
/// can log *why* a frame was rejected without string-matching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid message: malformed record")]
    Malformed,

    #[error("invalid message: unknown frame type '{0}'")]
    UnknownType(String),

    #[error("invalid message: {frame} missing required field '{field}'")]
    MissingField { frame: &'static str, field: &'static str },

    #[error("invalid message: {frame}.{field} is invalid ({reason})")]
    InvalidValue {
        frame: &'static str,
        field: &'static str,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
