//! Envelope codec for the duplex channel wire format.
//!
//! Inbound frames are JSON objects of the shape
//! `{ type, event, execution_id, data }`. Frames that passed through the
//! relaying layer carry the real envelope under `originalMessage`; decoding
//! normalizes both forms to a single [`Envelope`].

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Key under which relayed frames nest the real envelope.
pub const RELAY_WRAPPER_KEY: &str = "originalMessage";

/// Role this client announces on the channel.
pub const ROLE_FRONTEND: &str = "frontend";

/// Action understood by the channel's default route.
pub const ACTION_SEND_MESSAGE: &str = "sendmessage";

/// Envelope exchanged over the duplex channel.
///
/// Inbound envelopes are built with [`Envelope::from_object`], which never
/// fails: fields of an unexpected JSON type read as absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Routing action (outbound only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Message category: `output`, `status`, `input`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Event within the category, e.g. `stdout` or `input_required`.
    pub event: String,
    /// Execution the envelope belongs to.
    pub execution_id: String,
    /// Sender role, set on outbound envelopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Event payload. `Null` when absent.
    pub data: Value,
    /// Send time, RFC 3339 on outbound envelopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Envelope {
    /// Build an envelope from a decoded JSON object.
    ///
    /// Missing or non-string `type`, `event` and `execution_id` read as
    /// empty; non-string `action`, `role` and `timestamp` read as absent.
    #[must_use]
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(ToOwned::to_owned);
        Self {
            action: text("action"),
            kind: text("type").unwrap_or_default(),
            event: text("event").unwrap_or_default(),
            execution_id: text("execution_id").unwrap_or_default(),
            role: text("role"),
            data: object.get("data").cloned().unwrap_or(Value::Null),
            timestamp: text("timestamp"),
        }
    }

    /// Create an envelope with the given type, event and payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            action: None,
            kind: kind.into(),
            event: event.into(),
            execution_id: String::new(),
            role: None,
            data,
            timestamp: None,
        }
    }

    /// Outbound answer to an input prompt.
    #[must_use]
    pub fn user_input(text: &str) -> Self {
        Self {
            action: Some(ACTION_SEND_MESSAGE.to_string()),
            role: Some(ROLE_FRONTEND.to_string()),
            ..Self::new("input", "user_input", serde_json::json!({ "text": text }))
        }
    }

    /// Look up a field of the `data` object.
    #[must_use]
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_object().and_then(|d| d.get(key))
    }

    /// Look up a string field of the `data` object.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data_field(key).and_then(Value::as_str)
    }
}

/// Frame decoding error. Never fatal to the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is empty")]
    Empty,
    #[error("invalid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// Serialization error for outbound envelopes.
#[derive(Debug, Error)]
#[error("failed to encode envelope: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Result of decoding one inbound frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// The frame as parsed, before unwrapping.
    pub parsed: Value,
    /// The effective envelope.
    pub envelope: Envelope,
    /// True if the envelope was nested under `originalMessage`.
    pub relayed: bool,
}

/// An outbound envelope after stamping, with its wire text.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// The envelope with `execution_id` and `timestamp` filled in.
    pub envelope: Envelope,
    /// Serialized form sent on the channel.
    pub text: String,
}

/// Decode a raw frame into its effective envelope.
///
/// # Errors
/// Returns [`DecodeError`] if the frame is not a JSON object of the expected shape.
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    decode_frame(raw).map(|frame| frame.envelope)
}

/// Decode a raw frame, keeping the parsed JSON alongside the envelope.
///
/// # Errors
/// Returns [`DecodeError`] if the frame is empty, not JSON, or not a JSON object.
pub fn decode_frame(raw: &str) -> Result<DecodedFrame, DecodeError> {
    let parsed = parse(raw)?;
    let (envelope, relayed) = effective_envelope(&parsed)?;
    Ok(DecodedFrame {
        parsed,
        envelope,
        relayed,
    })
}

/// Parse a raw frame as JSON.
///
/// # Errors
/// Returns [`DecodeError::Empty`] for blank frames and [`DecodeError::Syntax`]
/// for invalid JSON.
pub fn parse(raw: &str) -> Result<Value, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    serde_json::from_str(raw).map_err(DecodeError::Syntax)
}

/// Pick the effective envelope out of a parsed frame.
///
/// The relaying layer wraps the sender's envelope under `originalMessage`.
/// When that key holds an object it wins; otherwise the frame itself is the
/// envelope. The flag is true for relayed frames.
///
/// # Errors
/// Returns [`DecodeError::NotAnObject`] if the frame is not a JSON object.
pub fn effective_envelope(parsed: &Value) -> Result<(Envelope, bool), DecodeError> {
    let object = parsed.as_object().ok_or(DecodeError::NotAnObject)?;
    match object.get(RELAY_WRAPPER_KEY) {
        Some(Value::Object(inner)) => Ok((Envelope::from_object(inner), true)),
        _ => Ok((Envelope::from_object(object), false)),
    }
}

/// Stamp `execution_id` and a fresh timestamp onto an envelope and serialize it.
///
/// # Errors
/// Returns [`EncodeError`] if serialization fails.
pub fn encode(mut envelope: Envelope, execution_id: &str) -> Result<Encoded, EncodeError> {
    envelope.execution_id = execution_id.to_string();
    envelope.timestamp = Some(now_timestamp());
    let text = serde_json::to_string(&envelope)?;
    Ok(Encoded { envelope, text })
}

/// Stamp and serialize an arbitrary JSON object.
///
/// Caller-provided `execution_id` and `timestamp` keys are overwritten.
///
/// # Errors
/// Returns [`EncodeError`] if serialization fails.
pub fn encode_payload(
    mut payload: Map<String, Value>,
    execution_id: &str,
) -> Result<String, EncodeError> {
    payload.insert(
        "execution_id".to_string(),
        Value::String(execution_id.to_string()),
    );
    payload.insert("timestamp".to_string(), Value::String(now_timestamp()));
    Ok(serde_json::to_string(&payload)?)
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
