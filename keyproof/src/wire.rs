// Wire grammar: the tagged {type, data} JSON envelope and its messages

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AuthError, Result};

/// Hash algorithm name accepted in CHALLENGE_RESPONSE payloads.
pub const HASH_SHA256: &str = "SHA-256";

/// Message tags recognized by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ClientId,
    Challenge,
    ChallengeResponse,
    SignatureMatches,
    SignatureMismatch,
    UnsupportedHash,
    ClientError,
    ServerError,
}

impl MessageKind {
    /// Wire spelling of the tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::ClientId => "CLIENT_ID",
            MessageKind::Challenge => "CHALLENGE",
            MessageKind::ChallengeResponse => "CHALLENGE_RESPONSE",
            MessageKind::SignatureMatches => "SIGNATURE_MATCHES",
            MessageKind::SignatureMismatch => "SIGNATURE_MISMATCH",
            MessageKind::UnsupportedHash => "UNSUPPORTED_HASH",
            MessageKind::ClientError => "CLIENT_ERROR",
            MessageKind::ServerError => "SERVER_ERROR",
        }
    }

    /// Parse a wire tag. `None` for tags outside the protocol.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CLIENT_ID" => Some(MessageKind::ClientId),
            "CHALLENGE" => Some(MessageKind::Challenge),
            "CHALLENGE_RESPONSE" => Some(MessageKind::ChallengeResponse),
            "SIGNATURE_MATCHES" => Some(MessageKind::SignatureMatches),
            "SIGNATURE_MISMATCH" => Some(MessageKind::SignatureMismatch),
            "UNSUPPORTED_HASH" => Some(MessageKind::UnsupportedHash),
            "CLIENT_ERROR" => Some(MessageKind::ClientError),
            "SERVER_ERROR" => Some(MessageKind::ServerError),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of protocol exchange: `{"type": <tag>, "data": <payload>}`.
///
/// `data` is tag-dependent and omitted entirely when absent. The tag stays a
/// raw string so out-of-protocol tags survive decoding and can be echoed in
/// error replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The wire tag. A missing `"type"` key reads as the empty string, which
    /// no state accepts, so it draws the same unexpected-type reply as any
    /// out-of-protocol tag.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

/// Keeps an explicit JSON `null` distinguishable from an absent `data` key:
/// serde would otherwise fold both into `None` for an `Option`. This runs only
/// when the key is present, so `null` becomes `Some(Value::Null)` while
/// `default` supplies `None` for a missing key.
fn deserialize_present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Decode one JSON text message.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode to JSON text.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Payload as a JSON string, the shape CLIENT_ID and CHALLENGE carry.
    pub fn text_payload(&self) -> Result<&str> {
        self.data
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::InvalidPayload {
                kind: self.kind.clone(),
                detail: "expected a string payload".to_owned(),
            })
    }

    /// Payload deserialized into a concrete record. An explicit `null`
    /// payload reads as the record's defaults; an absent `data` field is a
    /// parse failure, same as any other undecodable payload.
    pub fn typed_payload<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let value = match self.data.clone() {
            None => {
                return Err(AuthError::InvalidPayload {
                    kind: self.kind.clone(),
                    detail: "missing payload".to_owned(),
                })
            }
            Some(Value::Null) => return Ok(T::default()),
            Some(value) => value,
        };
        serde_json::from_value(value).map_err(|e| AuthError::InvalidPayload {
            kind: self.kind.clone(),
            detail: e.to_string(),
        })
    }
}

/// CHALLENGE_RESPONSE payload.
///
/// Missing fields decode to empty strings, so an absent hash or signature
/// reads as a plain mismatch downstream rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub hash: String,
}

/// Outbound protocol messages, one variant per tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// The client's self-describing identifier string.
    ClientId(String),
    /// Base64 of the raw challenge bytes.
    Challenge(String),
    /// Base64 signature plus the hash algorithm name.
    ChallengeResponse(ResponsePayload),
    /// Terminal success. No payload.
    SignatureMatches,
    /// Terminal failure with an optional detail string.
    SignatureMismatch(Option<String>),
    /// The offered hash algorithm is not supported.
    UnsupportedHash(String),
    /// The peer's message was invalid. Rides the wire as a bare string or as
    /// a `{message, error}` record, depending on whether a cause is known.
    ClientError {
        message: String,
        error: Option<String>,
    },
    /// A local failure while serving the handshake.
    ServerError { message: String, error: String },
}

impl Message {
    /// Bare-string CLIENT_ERROR.
    pub fn client_error(message: impl Into<String>) -> Self {
        Message::ClientError {
            message: message.into(),
            error: None,
        }
    }

    /// `{message, error}` CLIENT_ERROR.
    pub fn client_error_detailed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Message::ClientError {
            message: message.into(),
            error: Some(error.into()),
        }
    }

    /// `{message, error}` SERVER_ERROR.
    pub fn server_error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Message::ServerError {
            message: message.into(),
            error: error.into(),
        }
    }

    /// The tag this message carries.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ClientId(_) => MessageKind::ClientId,
            Message::Challenge(_) => MessageKind::Challenge,
            Message::ChallengeResponse(_) => MessageKind::ChallengeResponse,
            Message::SignatureMatches => MessageKind::SignatureMatches,
            Message::SignatureMismatch(_) => MessageKind::SignatureMismatch,
            Message::UnsupportedHash(_) => MessageKind::UnsupportedHash,
            Message::ClientError { .. } => MessageKind::ClientError,
            Message::ServerError { .. } => MessageKind::ServerError,
        }
    }

    /// Build the wire envelope.
    pub fn to_envelope(&self) -> Envelope {
        let data = match self {
            Message::ClientId(id) => Some(json!(id)),
            Message::Challenge(encoded) => Some(json!(encoded)),
            Message::ChallengeResponse(payload) => Some(json!(payload)),
            Message::SignatureMatches => None,
            Message::SignatureMismatch(detail) => detail.as_ref().map(|d| json!(d)),
            Message::UnsupportedHash(text) => Some(json!(text)),
            Message::ClientError {
                message,
                error: None,
            } => Some(json!(message)),
            Message::ClientError {
                message,
                error: Some(error),
            } => Some(json!({ "message": message, "error": error })),
            Message::ServerError { message, error } => {
                Some(json!({ "message": message, "error": error }))
            }
        };
        Envelope {
            kind: self.kind().as_str().to_owned(),
            data,
        }
    }

    /// Encode straight to JSON text.
    pub fn encode(&self) -> Result<String> {
        self.to_envelope().encode()
    }
}
