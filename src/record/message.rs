//! Push message decoding

use bytes::Bytes;
use serde_json::{json, Value};

use super::model::Record;
use crate::error::DecodeError;

/// `action` value of heartbeat messages, in both directions
pub const KEEP_ALIVE_ACTION: &str = "keepAlive";

/// A decoded push payload
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Heartbeat echo; carries no record
    KeepAlive,
    /// Created or updated record
    Update(Record),
}

impl InboundMessage {
    /// Decode a raw push payload
    ///
    /// `{ "action": "keepAlive" }` is a keep-alive; any other object must
    /// carry an `id` (or `sk`) and becomes a [`Record`].
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| DecodeError::Json(e.to_string()))?;

        let Value::Object(object) = value else {
            return Err(DecodeError::NotAnObject);
        };

        if object.get("action").and_then(Value::as_str) == Some(KEEP_ALIVE_ACTION) {
            return Ok(InboundMessage::KeepAlive);
        }

        Record::from_object(object).map(InboundMessage::Update)
    }

    pub fn is_keep_alive(&self) -> bool {
        matches!(self, InboundMessage::KeepAlive)
    }

    /// The carried record, if this is an update
    pub fn into_record(self) -> Option<Record> {
        match self {
            InboundMessage::Update(record) => Some(record),
            InboundMessage::KeepAlive => None,
        }
    }
}

/// Outbound keep-alive payload
pub fn keep_alive_payload() -> Bytes {
    Bytes::from(json!({ "action": KEEP_ALIVE_ACTION }).to_string())
}
