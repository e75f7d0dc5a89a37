use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// The HTTP method a viewer request may carry across the tunnel.
///
/// The wire protocol only ever needs to distinguish `GET` from `HEAD` —
/// fwdcast never proxies writes — so this is a closed set rather than a
/// free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "HEAD")]
    Head,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
        }
    }
}

/// A single tagged, length-delimited wire record exchanged between the
/// Relay and the Origin.
///
/// Discriminated on the `type` field, lowercased to match
/// `spec.md` §4.1's wire table exactly. Fields use camelCase on the wire
/// (`expiresAt`, `sessionId`) even though the rest of this repo is
/// idiomatic snake_case Rust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Register {
        path: String,
        #[serde(rename = "expiresAt")]
        expires_at: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    Registered {
        #[serde(rename = "sessionId")]
        session_id: String,
        url: String,
    },
    Request {
        id: String,
        method: Method,
        path: String,
    },
    Response {
        id: String,
        status: u16,
        headers: HashMap<String, String>,
    },
    Data {
        id: String,
        chunk: String,
    },
    End {
        id: String,
    },
    Expired {},
}

impl Frame {
    /// Build a `data` frame from raw bytes, base64-encoding the payload.
    pub fn data(id: impl Into<String>, bytes: &[u8]) -> Self {
        Frame::Data {
            id: id.into(),
            chunk: BASE64.encode(bytes),
        }
    }

    /// Decode this frame's `chunk` field back into raw bytes.
    ///
    /// Returns `None` for any non-`data` variant.
    pub fn decode_chunk(&self) -> Option<Result<Vec<u8>>> {
        match self {
            Frame::Data { chunk, .. } => Some(
                BASE64
                    .decode(chunk)
                    .map_err(|_| ProtocolError::InvalidValue {
                        frame: "data",
                        field: "chunk",
                        reason: "not valid base64",
                    }),
            ),
            _ => None,
        }
    }

    /// The request/response correlation ID carried by frames that have one.
    /// `register`, `registered`, and `expired` are not request-scoped.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Frame::Request { id, .. }
            | Frame::Response { id, .. }
            | Frame::Data { id, .. }
            | Frame::End { id } => Some(id),
            Frame::Register { .. } | Frame::Registered { .. } | Frame::Expired {} => None,
        }
    }

    /// Encode this frame as a single JSON text record.
    pub fn encode(&self) -> String {
        // Construction only ever goes through the typed variants above, so
        // every value here is already valid; a serialization failure would
        // be a bug in this module, not a runtime condition to propagate.
        serde_json::to_string(self).expect("Frame always serializes")
    }

    /// Decode a single JSON text record into a `Frame`, validating the
    /// fields the wire format constrains beyond plain shape (status range,
    /// method, non-empty paths).
    pub fn decode(text: &str) -> Result<Self> {
        let frame: Frame =
            serde_json::from_str(text).map_err(|_| ProtocolError::Malformed)?;
        frame.validate()?;
        Ok(frame)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Frame::Register { path, .. } if path.is_empty() => {
                Err(ProtocolError::InvalidValue {
                    frame: "register",
                    field: "path",
                    reason: "must be non-empty",
                })
            }
            Frame::Registered { url, .. } if url.is_empty() => {
                Err(ProtocolError::InvalidValue {
                    frame: "registered",
                    field: "url",
                    reason: "must be non-empty",
                })
            }
            Frame::Response { status, .. } if *status == 0 || *status > 599 || *status < 100 => {
                Err(ProtocolError::InvalidValue {
                    frame: "response",
                    field: "status",
                    reason: "must be in 100..=599",
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded).expect("decode should succeed");
        assert_eq!(frame, decoded);
    }

    #[test]
    fn register_roundtrips() {
        roundtrip(Frame::Register {
            path: "/home/user/share".into(),
            expires_at: 1_900_000_000,
            password: Some("hunter2".into()),
        });
        roundtrip(Frame::Register {
            path: "/home/user/share".into(),
            expires_at: 1_900_000_000,
            password: None,
        });
    }

    #[test]
    fn registered_roundtrips() {
        roundtrip(Frame::Registered {
            session_id: "a1b2c3d4e5f6".into(),
            url: "http://relay.example/a1b2c3d4e5f6/".into(),
        });
    }

    #[test]
    fn request_roundtrips() {
        roundtrip(Frame::Request {
            id: "req-1".into(),
            method: Method::Get,
            path: "hello.txt".into(),
        });
        roundtrip(Frame::Request {
            id: "req-2".into(),
            method: Method::Head,
            path: "".into(),
        });
    }

    #[test]
    fn response_roundtrips() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        roundtrip(Frame::Response {
            id: "req-1".into(),
            status: 200,
            headers,
        });
    }

    #[test]
    fn data_roundtrips_and_decodes_back_to_original_bytes() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let frame = Frame::data("req-1", &bytes);
        roundtrip(frame.clone());
        let decoded = frame.decode_chunk().unwrap().unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn empty_chunk_is_valid() {
        let frame = Frame::data("req-1", &[]);
        let decoded = frame.decode_chunk().unwrap().unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn end_roundtrips() {
        roundtrip(Frame::End { id: "req-1".into() });
    }

    #[test]
    fn expired_roundtrips() {
        roundtrip(Frame::Expired {});
    }

    #[test]
    fn unknown_type_fails() {
        let err = Frame::decode(r#"{"type":"bogus"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed));
    }

    #[test]
    fn missing_required_field_fails() {
        assert!(Frame::decode(r#"{"type":"register"}"#).is_err());
        assert!(Frame::decode(r#"{"type":"registered","sessionId":"abc"}"#).is_err());
        assert!(Frame::decode(r#"{"type":"request","id":"1","method":"GET"}"#).is_err());
        assert!(Frame::decode(r#"{"type":"response","id":"1","status":200}"#).is_err());
        assert!(Frame::decode(r#"{"type":"data","id":"1"}"#).is_err());
        assert!(Frame::decode(r#"{"type":"end"}"#).is_err());
    }

    #[test]
    fn zero_status_is_rejected() {
        let err = Frame::decode(r#"{"type":"response","id":"1","status":0,"headers":{}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidValue { field: "status", .. }
        ));
    }

    #[test]
    fn invalid_method_fails() {
        assert!(Frame::decode(r#"{"type":"request","id":"1","method":"POST","path":"x"}"#).is_err());
    }

    #[test]
    fn empty_register_path_is_rejected() {
        let err = Frame::decode(r#"{"type":"register","path":"","expiresAt":1}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidValue { field: "path", .. }
        ));
    }
}
