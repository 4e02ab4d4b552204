//! Wire types: control messages, body records, and transport frames.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The `query_status` values a control message may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Scheduled,
    Accepted,
    Complete,
    Canceled,
    Error,
}

/// A JSON object received from the server on the control channel.
///
/// Fields other than `query_status` (e.g. schema metadata on `accepted`)
/// are preserved opaquely in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub query_status: QueryStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ControlMessage {
    /// Parse a text frame as a control message.
    ///
    /// A message lacking `query_status` (or not a JSON object at all) is a
    /// [`Error::Protocol`] failure, matching `spec.md`'s receive-and-check
    /// routine.
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("control message missing query_status: {e}")))
    }

    /// Best-effort parse used only during cancellation, where a FIN body
    /// frame may or may not decode to a `canceled` sentinel.
    pub fn try_parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// A record in the body: a JSON object streamed under path `item`.
///
/// Expected to expose at least `receipt_timestamp` and `sequence_number`;
/// `message_number` is optional. All other fields are preserved in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub receipt_timestamp: i64,
    pub sequence_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_number: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A binary WebSocket frame: opaque payload plus the FIN marker.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub fin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_message_parses_known_status() {
        let msg = ControlMessage::parse(r#"{"query_status":"accepted","schema":{"a":1}}"#)
            .expect("parse");
        assert_eq!(msg.query_status, QueryStatus::Accepted);
        assert_eq!(msg.extra.get("schema").unwrap(), &serde_json::json!({"a": 1}));
    }

    #[test]
    fn control_message_without_query_status_is_protocol_error() {
        let err = ControlMessage::parse(r#"{"foo":"bar"}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn record_preserves_unknown_fields() {
        let record: Record =
            serde_json::from_str(r#"{"receipt_timestamp":1,"sequence_number":2,"a":"x"}"#)
                .unwrap();
        assert_eq!(record.message_number, None);
        assert_eq!(record.extra.get("a").unwrap(), "x");
    }
}
