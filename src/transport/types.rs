use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound message as delivered to a node's handler.
///
/// The body is the raw JSON wire payload; decoding it is the receiver's job.
/// When the sender issued a synchronous call, `replier` carries the single-use
/// channel the response must travel back on. Fire-and-forget sends arrive with
/// `replier: None`.
#[derive(Debug)]
pub struct Incoming {
    pub src: NodeId,
    pub body: serde_json::Value,
    pub replier: Option<Replier>,
}

/// Single-use reply handle for a synchronous call.
///
/// Consumed on reply; may be moved into a spawned task so a handler can
/// acknowledge without blocking on the rest of its work.
#[derive(Debug)]
pub struct Replier {
    tx: oneshot::Sender<serde_json::Value>,
}

impl Replier {
    pub fn new(tx: oneshot::Sender<serde_json::Value>) -> Self {
        Self { tx }
    }

    pub fn reply(self, body: serde_json::Value) -> Result<()> {
        self.tx
            .send(body)
            .map_err(|_| anyhow::anyhow!("caller no longer waiting for reply"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering_is_lexicographic() {
        let mut ids = vec![
            NodeId::new("n2"),
            NodeId::new("n0"),
            NodeId::new("n1"),
        ];
        ids.sort();
        assert_eq!(ids[0], NodeId::new("n0"));
    }

    #[tokio::test]
    async fn test_replier_delivers_body() {
        let (tx, rx) = oneshot::channel();
        let replier = Replier::new(tx);

        replier.reply(serde_json::json!({"type": "read_ok"})).unwrap();

        let body = rx.await.unwrap();
        assert_eq!(body["type"], "read_ok");
    }

    #[tokio::test]
    async fn test_replier_errors_when_caller_gone() {
        let (tx, rx) = oneshot::channel::<serde_json::Value>();
        drop(rx);

        let replier = Replier::new(tx);
        assert!(replier.reply(serde_json::json!({})).is_err());
    }
}
