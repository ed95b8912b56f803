//! Broadcast Wire Protocol
//!
//! Defines the JSON bodies exchanged between nodes and with clients. The
//! `type` tag and field names are the wire contract; everything else about a
//! message (ids, correlation) belongs to the transport layer.

use serde::{Deserialize, Serialize};

/// An application-submitted broadcast token. Carried as a JSON number on the
/// wire; only exact equality matters, no ordering is assumed.
pub type Value = i64;

/// Every body this node sends or accepts.
///
/// - `Read`/`ReadOk`: "what have you seen" query and its unordered answer.
/// - `Broadcast`/`BroadcastOk`: value submission, single (`message`) or
///   batched (`messages`); the ack may arrive before propagation finishes.
/// - `Topology`/`TopologyOk`: acknowledged and otherwise ignored — fan-out
///   routing is derived from the member list, not from this message.
/// - `Yap`/`YapOk`: internal per-value propagation. `YapOk` is only produced
///   when the yap arrives over the synchronous call path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Read,
    ReadOk {
        messages: Vec<Value>,
    },
    Broadcast {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        messages: Option<Vec<Value>>,
    },
    BroadcastOk,
    Topology {
        #[serde(skip_serializing_if = "Option::is_none")]
        topology: Option<serde_json::Value>,
    },
    TopologyOk,
    Yap {
        message: Value,
    },
    YapOk,
}

impl WireMessage {
    /// Builds the outbound body for one flushed batch.
    pub fn batch(values: Vec<Value>) -> Self {
        WireMessage::Broadcast {
            message: None,
            messages: Some(values),
        }
    }

    /// Collects the submitted values of a `Broadcast` body, whichever field
    /// (or both) the sender used.
    pub fn submitted_values(message: Option<Value>, messages: Option<Vec<Value>>) -> Vec<Value> {
        let mut values = Vec::new();
        if let Some(value) = message {
            values.push(value);
        }
        if let Some(batch) = messages {
            values.extend(batch);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_accepts_single_message() {
        let body: WireMessage =
            serde_json::from_value(serde_json::json!({"type": "broadcast", "message": 5})).unwrap();

        let WireMessage::Broadcast { message, messages } = body else {
            panic!("wrong variant");
        };
        assert_eq!(WireMessage::submitted_values(message, messages), vec![5]);
    }

    #[test]
    fn test_broadcast_accepts_batched_messages() {
        let body: WireMessage = serde_json::from_value(
            serde_json::json!({"type": "broadcast", "messages": [7, 8, 9]}),
        )
        .unwrap();

        let WireMessage::Broadcast { message, messages } = body else {
            panic!("wrong variant");
        };
        assert_eq!(
            WireMessage::submitted_values(message, messages),
            vec![7, 8, 9]
        );
    }

    #[test]
    fn test_read_ok_wire_shape() {
        let json = serde_json::to_value(WireMessage::ReadOk {
            messages: vec![1, 2],
        })
        .unwrap();

        assert_eq!(json["type"], "read_ok");
        assert_eq!(json["messages"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_batch_body_omits_single_message_field() {
        let json = serde_json::to_value(WireMessage::batch(vec![7])).unwrap();

        assert_eq!(json["type"], "broadcast");
        assert_eq!(json["messages"], serde_json::json!([7]));
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_topology_accepts_arbitrary_map() {
        let body: WireMessage = serde_json::from_value(serde_json::json!({
            "type": "topology",
            "topology": {"n0": ["n1", "n2"]},
        }))
        .unwrap();

        assert!(matches!(body, WireMessage::Topology { .. }));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result: Result<WireMessage, _> =
            serde_json::from_value(serde_json::json!({"type": "gossip"}));
        assert!(result.is_err());
    }
}
