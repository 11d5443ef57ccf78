//! Wire messages exchanged with the scale server.
//!
//! Frames are JSON text: `{"type": "...", "data": ...}`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use wt_core::{Reading, Unit, normalize};

/// Client type announced when registering with the server.
const CLIENT_TYPE: &str = "dashboard";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Type tag and raw payload of an incoming frame.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Weight sample as sent by the scale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeightPayload {
    pub weight: f64,
    /// `"kg"` or `"g"`; anything else (including absent) is read as grams.
    #[serde(default)]
    pub unit: String,
}

/// Decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Welcome { message: Option<String> },
    Weight(WeightPayload),
    History { records: usize },
    Unknown { kind: String },
}

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Register {
        client_type: &'static str,
        scale_id: u32,
    },
}

impl ClientMessage {
    pub const fn register(scale_id: u32) -> Self {
        Self::Register {
            client_type: CLIENT_TYPE,
            scale_id,
        }
    }
}

pub fn encode(message: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

pub fn decode(text: &str) -> Result<ServerMessage, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let message = match envelope.kind.as_str() {
        "welcome" => ServerMessage::Welcome {
            message: envelope
                .data
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "weight" => {
            let payload = serde_json::from_value(envelope.data)
                .map_err(|source| ProtocolError::Payload {
                    kind: "weight",
                    source,
                })?;
            ServerMessage::Weight(payload)
        }
        "history" => ServerMessage::History {
            records: envelope.data.as_array().map_or(0, Vec::len),
        },
        _ => ServerMessage::Unknown {
            kind: envelope.kind,
        },
    };

    Ok(message)
}

/// Decodes a frame and returns the normalized reading it carries.
///
/// Frames without a usable reading are logged and skipped.
pub fn reading_from_frame(text: &str, received_at: NaiveDateTime) -> Option<Reading> {
    match decode(text) {
        Ok(ServerMessage::Weight(payload)) => {
            match normalize(payload.weight, Unit::from_unit_str(&payload.unit), received_at) {
                Ok(reading) => Some(reading),
                Err(err) => {
                    tracing::warn!(%err, "ignoring weight sample");
                    None
                }
            }
        }
        Ok(ServerMessage::Welcome { message }) => {
            tracing::info!(message = message.as_deref().unwrap_or(""), "server welcome");
            None
        }
        Ok(ServerMessage::History { records }) => {
            tracing::info!(records, "received history");
            None
        }
        Ok(ServerMessage::Unknown { kind }) => {
            tracing::debug!(kind = %kind, "ignoring unknown message type");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "skipping malformed frame");
            None
        }
    }
}
