//! Messages exchanged with the inference endpoint.
//!
//! The channel carries JSON text frames tagged by `kind`:
//!
//! ```text
//! client → server   {"kind":"frame","type":"frame","data":"data:image/jpeg;base64,…"}
//! server → client   {"kind":"ping"}
//! server → client   {"kind":"result","word":"а","confidence":0.92}
//! ```
//!
//! Decoding also accepts the older `type` tag and an untagged
//! `{"word":…,"confidence":…}` result, which is what deployed classifiers emit.
//! Outbound frames carry both tags because those classifiers only read `type`.
//! A confidence that is not a finite number is dropped; the label still counts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    Malformed(String),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no kind tag")]
    MissingKind,

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} message: {reason}")]
    InvalidBody { kind: &'static str, reason: String },

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Every message shape the channel knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Server heartbeat; carries no state.
    Ping,
    /// One encoded camera frame.
    Frame { data: String },
    /// A classification of the most recent frame window.
    Result {
        word: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
}

#[derive(Deserialize)]
struct FrameBody {
    data: String,
}

#[derive(Deserialize)]
struct ResultBody {
    word: String,
    #[serde(default)]
    confidence: Option<Value>,
}

/// Outbound frame shape, tagged under both field names.
#[derive(Serialize)]
struct FrameOut<'a> {
    kind: &'static str,
    #[serde(rename = "type")]
    tag: &'static str,
    data: &'a str,
}

impl Message {
    #[must_use]
    pub fn frame(data: impl Into<String>) -> Self {
        Self::Frame { data: data.into() }
    }

    /// Serialize to the JSON text sent over the channel.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let encoded = match self {
            Self::Frame { data } => serde_json::to_string(&FrameOut {
                kind: "frame",
                tag: "frame",
                data,
            }),
            other => serde_json::to_string(other),
        };
        encoded.map_err(|err| ProtocolError::Encode(err.to_string()))
    }

    /// Parse an inbound text frame.
    ///
    /// Confidence values are clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` for invalid JSON, non-object payloads, missing or
    /// unknown tags, and bodies that do not fit their tag.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
        let Value::Object(object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        match tag_of(&object) {
            Some("ping") => Ok(Self::Ping),
            Some("frame") => {
                let body: FrameBody = body_of(object, "frame")?;
                Ok(Self::Frame { data: body.data })
            }
            Some("result") => Self::result_from(object),
            Some(other) => Err(ProtocolError::UnknownKind(other.to_string())),
            None if object.contains_key("word") => Self::result_from(object),
            None => Err(ProtocolError::MissingKind),
        }
    }

    fn result_from(object: Map<String, Value>) -> Result<Self, ProtocolError> {
        let body: ResultBody = body_of(object, "result")?;
        Ok(Self::Result {
            word: body.word,
            confidence: body
                .confidence
                .as_ref()
                .and_then(Value::as_f64)
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0)),
        })
    }
}

fn tag_of(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("kind")
        .or_else(|| object.get("type"))
        .and_then(Value::as_str)
}

fn body_of<T: serde::de::DeserializeOwned>(
    object: Map<String, Value>,
    kind: &'static str,
) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(object)).map_err(|err| ProtocolError::InvalidBody {
        kind,
        reason: err.to_string(),
    })
}
