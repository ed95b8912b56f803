use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::Transport;
use super::types::{Incoming, NodeId, Replier};

const INBOX_CAPACITY: usize = 1024;

/// In-process message router.
///
/// Connects any number of co-located nodes: each `join` registers an inbox
/// and hands back a `MemoryTransport` bound to that identity. Delivery is a
/// channel send, correlation for synchronous calls is a oneshot carried
/// inside the message.
///
/// ## Fault injection
/// Links are directional `(src, dest)` pairs. A link can be cut permanently,
/// told to fail its next K deliveries, or the whole net can drop messages
/// with a fixed probability. A faulted delivery fails at the sender, which is
/// how an unreliable substrate looks to the retry layer.
pub struct MemoryNet {
    inboxes: DashMap<NodeId, mpsc::Sender<Incoming>>,
    faults: DashMap<(NodeId, NodeId), LinkFault>,
    loss_rate: Mutex<f64>,
}

#[derive(Debug, Default)]
struct LinkFault {
    down: bool,
    fail_next: u32,
}

impl MemoryNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: DashMap::new(),
            faults: DashMap::new(),
            loss_rate: Mutex::new(0.0),
        })
    }

    /// Registers a node and returns its transport handle plus the inbox end
    /// the node's receive loop consumes.
    pub fn join(self: &Arc<Self>, id: NodeId) -> (MemoryTransport, mpsc::Receiver<Incoming>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.inboxes.insert(id.clone(), tx);

        tracing::debug!("Node {} joined the in-memory net", id);

        let transport = MemoryTransport {
            id,
            net: self.clone(),
        };
        (transport, rx)
    }

    /// All registered node ids, sorted. Sorting makes the member list
    /// deterministic for every observer.
    pub fn member_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.inboxes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Permanently fails every delivery from `src` to `dest`.
    pub fn cut_link(&self, src: &NodeId, dest: &NodeId) {
        self.faults
            .entry((src.clone(), dest.clone()))
            .or_default()
            .down = true;
    }

    /// Undoes `cut_link`.
    pub fn restore_link(&self, src: &NodeId, dest: &NodeId) {
        if let Some(mut fault) = self.faults.get_mut(&(src.clone(), dest.clone())) {
            fault.down = false;
        }
    }

    /// Fails the next `count` deliveries from `src` to `dest`, then lets the
    /// link recover on its own.
    pub fn fail_next(&self, src: &NodeId, dest: &NodeId, count: u32) {
        self.faults
            .entry((src.clone(), dest.clone()))
            .or_default()
            .fail_next = count;
    }

    /// Drops every delivery with probability `rate` (0.0..=1.0), on top of
    /// any per-link faults.
    pub fn set_loss_rate(&self, rate: f64) {
        *self.loss_rate.lock() = rate.clamp(0.0, 1.0);
    }

    fn check_link(&self, src: &NodeId, dest: &NodeId) -> Result<()> {
        let rate = *self.loss_rate.lock();
        if rate > 0.0 && rand::random::<f64>() < rate {
            return Err(anyhow::anyhow!("message {} -> {} lost", src, dest));
        }

        if let Some(mut fault) = self.faults.get_mut(&(src.clone(), dest.clone())) {
            if fault.down {
                return Err(anyhow::anyhow!("link {} -> {} is down", src, dest));
            }
            if fault.fail_next > 0 {
                fault.fail_next -= 1;
                return Err(anyhow::anyhow!("link {} -> {} failed delivery", src, dest));
            }
        }

        Ok(())
    }

    async fn deliver(
        &self,
        src: &NodeId,
        dest: &NodeId,
        body: serde_json::Value,
        replier: Option<Replier>,
    ) -> Result<()> {
        self.check_link(src, dest)?;

        let inbox = self
            .inboxes
            .get(dest)
            .map(|e| e.value().clone())
            .ok_or_else(|| anyhow::anyhow!("unknown destination {}", dest))?;

        inbox
            .send(Incoming {
                src: src.clone(),
                body,
                replier,
            })
            .await
            .map_err(|_| anyhow::anyhow!("inbox of {} is closed", dest))
    }

    /// Fire-and-forget delivery on behalf of `src`. Also usable by synthetic
    /// clients that never joined the net.
    pub async fn send_from(
        &self,
        src: &NodeId,
        dest: &NodeId,
        body: serde_json::Value,
    ) -> Result<()> {
        self.deliver(src, dest, body, None).await
    }

    /// Synchronous call on behalf of `src`: delivers the body and waits for
    /// the reply, failing once `timeout` elapses or the peer drops the call.
    pub async fn rpc_from(
        &self,
        src: &NodeId,
        dest: &NodeId,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        self.deliver(src, dest, body, Some(Replier::new(tx))).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(anyhow::anyhow!("{} dropped the call without replying", dest)),
            Err(_) => Err(anyhow::anyhow!("rpc {} -> {} timed out", src, dest)),
        }
    }
}

/// A single node's view of the `MemoryNet`.
pub struct MemoryTransport {
    id: NodeId,
    net: Arc<MemoryNet>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn node_id(&self) -> NodeId {
        self.id.clone()
    }

    fn member_ids(&self) -> Vec<NodeId> {
        self.net.member_ids()
    }

    async fn send(&self, dest: &NodeId, body: serde_json::Value) -> Result<()> {
        self.net.send_from(&self.id, dest, body).await
    }

    async fn rpc(
        &self,
        dest: &NodeId,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        self.net.rpc_from(&self.id, dest, body, timeout).await
    }
}
