//! Transport Seam
//!
//! The broadcast engine never owns a socket. Everything it knows about the
//! outside world comes through the `Transport` trait: who this node is, who
//! the cluster members are, and two delivery primitives (fire-and-forget
//! send, timed request/response call). Request/response correlation and
//! message framing belong to the transport implementation, not the engine.
//!
//! ## Implementations
//! - **`memory`**: an in-process router connecting co-located nodes through
//!   channels, with per-link fault injection. Backs the test suite and the
//!   simulation binary.

pub mod memory;
pub mod types;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use self::types::NodeId;

/// Messaging substrate consumed by the broadcast engine.
///
/// Bodies are raw JSON values; the wire contract over them is defined by the
/// engine's protocol module. Implementations are expected to be unreliable:
/// a send may vanish, an rpc may fail or time out. They must never corrupt
/// or forge a body.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// This node's own identifier.
    fn node_id(&self) -> NodeId;

    /// The full cluster member list, this node included.
    fn member_ids(&self) -> Vec<NodeId>;

    /// Fire-and-forget delivery. An `Ok` means the message was handed to the
    /// substrate, not that it arrived.
    async fn send(&self, dest: &NodeId, body: serde_json::Value) -> Result<()>;

    /// Synchronous call: delivers the body and waits for the peer's reply,
    /// failing once `timeout` elapses.
    async fn rpc(
        &self,
        dest: &NodeId,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value>;
}

#[cfg(test)]
mod tests;
