use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::transport::Transport;
use crate::transport::types::{Incoming, NodeId, Replier};

use super::protocol::{Value, WireMessage};
use super::rpc::rpc_with_retry;
use super::state::BroadcastState;

pub const FLUSH_INTERVAL: Duration = Duration::from_millis(500);
pub const RPC_ATTEMPTS: u32 = 100;
pub const RPC_TIMEOUT: Duration = Duration::from_secs(1);

/// How a node pushes observed values onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisseminationMode {
    /// Every submission fans a `yap` out to all peers immediately. Lowest
    /// latency, O(peers) calls per submitted value.
    Eager,
    /// Submissions accumulate and a periodic flush pushes the whole batch one
    /// hierarchy level: leaves push to the coordinator, the coordinator
    /// floods everyone. O(1) calls per round at a leaf, O(peers) at the
    /// coordinator, which makes the coordinator the hot spot.
    Batched,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub mode: DisseminationMode,
    pub flush_interval: Duration,
    pub rpc_attempts: u32,
    pub rpc_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            mode: DisseminationMode::Batched,
            flush_interval: FLUSH_INTERVAL,
            rpc_attempts: RPC_ATTEMPTS,
            rpc_timeout: RPC_TIMEOUT,
        }
    }
}

/// Outcome of one dissemination round, per destination.
///
/// A destination lands in `failed` once its whole retry budget is spent; the
/// batch is not re-queued for it. That peer converges by hearing the values
/// from someone else's round instead.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// How many values the round carried.
    pub values: usize,
    pub delivered: Vec<NodeId>,
    pub failed: Vec<(NodeId, String)>,
}

/// One node's broadcast engine.
///
/// Owns the seen/pending state, handles the four inbound message types, and
/// runs the dissemination of whatever mode it was configured with. All
/// network knowledge comes from the injected transport.
pub struct BroadcastService<T: Transport> {
    transport: Arc<T>,
    state: BroadcastState,
    config: BroadcastConfig,
}

impl<T: Transport> BroadcastService<T> {
    pub fn new(transport: Arc<T>, config: BroadcastConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            state: BroadcastState::new(),
            config,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.transport.node_id()
    }

    /// Spawns the background tasks and returns immediately: the receive loop
    /// always, the flush timer only in batched mode. The tasks run until the
    /// process exits; there is no graceful shutdown.
    pub fn start(self: &Arc<Self>, inbox: mpsc::Receiver<Incoming>) {
        let service = self.clone();
        tokio::spawn(async move {
            service.receive_loop(inbox).await;
        });

        if self.config.mode == DisseminationMode::Batched {
            let service = self.clone();
            tokio::spawn(async move {
                service.flush_loop().await;
            });
        }

        tracing::info!("Broadcast service started on {}", self.node_id());
    }

    async fn receive_loop(self: Arc<Self>, mut inbox: mpsc::Receiver<Incoming>) {
        while let Some(incoming) = inbox.recv().await {
            let src = incoming.src.clone();
            if let Err(e) = self.handle(incoming).await {
                tracing::error!("Error handling message from {}: {}", src, e);
            }
        }

        tracing::debug!("Inbox of {} closed, receive loop exiting", self.node_id());
    }

    /// Decodes and dispatches one inbound message. A body that does not
    /// parse fails here, before any state is touched.
    pub async fn handle(&self, incoming: Incoming) -> Result<()> {
        let Incoming { src, body, replier } = incoming;
        let message: WireMessage = serde_json::from_value(body)?;

        match message {
            WireMessage::Read => self.handle_read(replier),
            WireMessage::Broadcast { message, messages } => {
                self.handle_broadcast(message, messages, replier)
            }
            WireMessage::Topology { .. } => self.handle_topology(replier),
            WireMessage::Yap { message } => self.handle_yap(message, replier),
            other => Err(anyhow::anyhow!(
                "unexpected {:?} from {} outside a call reply",
                other,
                src
            )),
        }
    }

    fn handle_read(&self, replier: Option<Replier>) -> Result<()> {
        let replier =
            replier.ok_or_else(|| anyhow::anyhow!("read request without reply channel"))?;

        let messages = self.state.snapshot();
        replier.reply(serde_json::to_value(WireMessage::ReadOk { messages })?)
    }

    /// Acknowledged before anything else and no update performed: fan-out
    /// routing is derived from the member list, not from the client-supplied
    /// topology assignment.
    fn handle_topology(&self, replier: Option<Replier>) -> Result<()> {
        let replier =
            replier.ok_or_else(|| anyhow::anyhow!("topology request without reply channel"))?;

        replier.reply(serde_json::to_value(WireMessage::TopologyOk)?)
    }

    fn handle_broadcast(
        &self,
        message: Option<Value>,
        messages: Option<Vec<Value>>,
        replier: Option<Replier>,
    ) -> Result<()> {
        // Ack from a detached task: the caller is told "accepted" without
        // waiting on propagation.
        if let Some(replier) = replier {
            let ack = serde_json::to_value(WireMessage::BroadcastOk)?;
            tokio::spawn(async move {
                if let Err(e) = replier.reply(ack) {
                    tracing::debug!("Broadcast ack went unclaimed: {}", e);
                }
            });
        }

        let values = WireMessage::submitted_values(message, messages);
        if values.is_empty() {
            return Ok(());
        }

        match self.config.mode {
            DisseminationMode::Batched => {
                let newly_seen = self.state.observe_all(&values);
                tracing::debug!(
                    "Queued {} of {} submitted values on {}",
                    newly_seen,
                    values.len(),
                    self.node_id()
                );
            }
            DisseminationMode::Eager => {
                let mut yaps = Vec::with_capacity(values.len());
                for &value in &values {
                    self.state.mark_seen(value);
                    yaps.push(serde_json::to_value(WireMessage::Yap { message: value })?);
                }
                self.spawn_fanout(yaps);
            }
        }

        Ok(())
    }

    fn handle_yap(&self, value: Value, replier: Option<Replier>) -> Result<()> {
        self.state.mark_seen(value);

        // Only the synchronous call path expects an answer.
        if let Some(replier) = replier {
            replier.reply(serde_json::to_value(WireMessage::YapOk)?)?;
        }

        Ok(())
    }

    /// Eager-mode propagation: one retrying call per (value, peer), all
    /// concurrent, supervised by a detached task that joins the whole set and
    /// logs every exhausted budget.
    fn spawn_fanout(&self, yaps: Vec<serde_json::Value>) {
        let peers = self.peers();
        if peers.is_empty() {
            return;
        }

        let transport = self.transport.clone();
        let attempts = self.config.rpc_attempts;
        let timeout = self.config.rpc_timeout;

        tokio::spawn(async move {
            let mut calls = JoinSet::new();

            for body in &yaps {
                for peer in &peers {
                    let transport = transport.clone();
                    let peer = peer.clone();
                    let body = body.clone();
                    calls.spawn(async move {
                        let outcome =
                            rpc_with_retry(transport.as_ref(), &peer, &body, attempts, timeout)
                                .await;
                        (peer, outcome)
                    });
                }
            }

            while let Some(joined) = calls.join_next().await {
                match joined {
                    Ok((peer, Ok(_))) => {
                        tracing::trace!("Propagated to {}", peer);
                    }
                    Ok((peer, Err(e))) => {
                        tracing::warn!("Gave up propagating to {}: {}", peer, e);
                    }
                    Err(e) => {
                        tracing::error!("Propagation task failed: {}", e);
                    }
                }
            }
        });
    }

    async fn flush_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.flush_interval);

        loop {
            interval.tick().await;

            match self.flush_pending().await {
                Ok(report) if report.values > 0 => {
                    tracing::debug!(
                        "Flushed {} value(s) from {}: {} delivered, {} failed",
                        report.values,
                        self.node_id(),
                        report.delivered.len(),
                        report.failed.len()
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Flush round on {} failed: {}", self.node_id(), e);
                }
            }
        }
    }

    /// One dissemination round: takes the pending batch out, pushes it to
    /// this node's hierarchy destinations with one retrying call each, and
    /// reports the per-destination outcome. The batch is gone from the queue
    /// whatever happens; failed destinations are not retried in later rounds.
    pub async fn flush_pending(&self) -> Result<FlushReport> {
        let batch = self.state.drain_pending();
        if batch.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport {
            values: batch.len(),
            ..FlushReport::default()
        };

        let destinations = self.flush_destinations();
        if destinations.is_empty() {
            // Single-node cluster: already in the seen set, nobody to tell.
            return Ok(report);
        }

        let body = serde_json::to_value(WireMessage::batch(batch))?;
        let attempts = self.config.rpc_attempts;
        let timeout = self.config.rpc_timeout;

        let mut calls = JoinSet::new();
        for dest in destinations {
            let transport = self.transport.clone();
            let body = body.clone();
            calls.spawn(async move {
                let outcome =
                    rpc_with_retry(transport.as_ref(), &dest, &body, attempts, timeout).await;
                (dest, outcome)
            });
        }

        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((dest, Ok(_))) => report.delivered.push(dest),
                Ok((dest, Err(e))) => {
                    tracing::warn!("Batch delivery to {} exhausted its budget: {}", dest, e);
                    report.failed.push((dest, e.to_string()));
                }
                Err(e) => {
                    tracing::error!("Flush delivery task failed: {}", e);
                }
            }
        }

        Ok(report)
    }

    /// Where this node pushes a batch: the coordinator (lexicographically
    /// first member) floods every other member, everyone else pushes to the
    /// coordinator only.
    fn flush_destinations(&self) -> Vec<NodeId> {
        let mut members = self.transport.member_ids();
        members.sort();

        let Some(coordinator) = members.first().cloned() else {
            return Vec::new();
        };

        let self_id = self.transport.node_id();
        if coordinator == self_id {
            members.retain(|member| *member != self_id);
            members
        } else {
            vec![coordinator]
        }
    }

    fn peers(&self) -> Vec<NodeId> {
        let self_id = self.transport.node_id();
        self.transport
            .member_ids()
            .into_iter()
            .filter(|member| *member != self_id)
            .collect()
    }

    /// The seen set, in no particular order.
    pub fn snapshot(&self) -> Vec<Value> {
        self.state.snapshot()
    }

    pub fn seen_count(&self) -> usize {
        self.state.seen_count()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending_count()
    }
}
