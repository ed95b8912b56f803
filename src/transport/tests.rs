//! Transport Module Tests
//!
//! Validates the in-memory router: registration, delivery, synchronous call
//! correlation, and the link fault controls the scenario tests depend on.

use std::time::Duration;

use crate::transport::Transport;
use crate::transport::memory::MemoryNet;
use crate::transport::types::{Incoming, NodeId};

/// Spawns a node whose handler echoes every synchronous call back with an
/// `"echoed": true` marker and ignores fire-and-forget sends.
fn spawn_echo_node(net: &std::sync::Arc<MemoryNet>, id: &str) -> NodeId {
    let id = NodeId::new(id);
    let (_transport, mut inbox) = net.join(id.clone());

    tokio::spawn(async move {
        while let Some(Incoming { body, replier, .. }) = inbox.recv().await {
            if let Some(replier) = replier {
                let mut reply = body;
                reply["echoed"] = serde_json::json!(true);
                let _ = replier.reply(reply);
            }
        }
    });

    id
}

// ============================================================
// MEMBERSHIP VIEW
// ============================================================

#[tokio::test]
async fn test_member_ids_sorted_and_complete() {
    let net = MemoryNet::new();
    let (t2, _rx2) = net.join(NodeId::new("n2"));
    let (_t0, _rx0) = net.join(NodeId::new("n0"));
    let (_t1, _rx1) = net.join(NodeId::new("n1"));

    let members = t2.member_ids();
    assert_eq!(
        members,
        vec![NodeId::new("n0"), NodeId::new("n1"), NodeId::new("n2")]
    );
    assert_eq!(t2.node_id(), NodeId::new("n2"));
}

// ============================================================
// DELIVERY & CORRELATION
// ============================================================

#[tokio::test]
async fn test_rpc_roundtrip() {
    let net = MemoryNet::new();
    let echo = spawn_echo_node(&net, "echo");

    let client = NodeId::new("c0");
    let reply = net
        .rpc_from(
            &client,
            &echo,
            serde_json::json!({"type": "probe"}),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(reply["type"], "probe");
    assert_eq!(reply["echoed"], true);
}

#[tokio::test]
async fn test_send_is_fire_and_forget() {
    let net = MemoryNet::new();
    let id = NodeId::new("sink");
    let (_transport, mut inbox) = net.join(id.clone());

    let client = NodeId::new("c0");
    net.send_from(&client, &id, serde_json::json!({"type": "yap", "message": 3}))
        .await
        .unwrap();

    let incoming = inbox.recv().await.unwrap();
    assert_eq!(incoming.src, client);
    assert!(incoming.replier.is_none());
}

#[tokio::test]
async fn test_rpc_times_out_without_reply() {
    let net = MemoryNet::new();
    // Node that never answers
    let id = NodeId::new("mute");
    let (_transport, _inbox) = net.join(id.clone());

    let client = NodeId::new("c0");
    let result = net
        .rpc_from(
            &client,
            &id,
            serde_json::json!({"type": "probe"}),
            Duration::from_millis(50),
        )
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_rpc_to_unknown_destination_fails() {
    let net = MemoryNet::new();
    let client = NodeId::new("c0");

    let result = net
        .rpc_from(
            &client,
            &NodeId::new("ghost"),
            serde_json::json!({"type": "probe"}),
            Duration::from_millis(50),
        )
        .await;

    assert!(result.is_err());
}

// ============================================================
// FAULT INJECTION
// ============================================================

#[tokio::test]
async fn test_cut_link_is_directional_and_restorable() {
    let net = MemoryNet::new();
    let a = spawn_echo_node(&net, "a");
    let b = spawn_echo_node(&net, "b");
    let body = serde_json::json!({"type": "probe"});

    net.cut_link(&a, &b);
    assert!(
        net.rpc_from(&a, &b, body.clone(), Duration::from_millis(50))
            .await
            .is_err()
    );

    // Reverse direction unaffected
    assert!(
        net.rpc_from(&b, &a, body.clone(), Duration::from_secs(1))
            .await
            .is_ok()
    );

    net.restore_link(&a, &b);
    assert!(
        net.rpc_from(&a, &b, body, Duration::from_secs(1))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_fail_next_recovers_after_count() {
    let net = MemoryNet::new();
    let echo = spawn_echo_node(&net, "echo");
    let client = NodeId::new("c0");
    let body = serde_json::json!({"type": "probe"});

    net.fail_next(&client, &echo, 2);

    for _ in 0..2 {
        assert!(
            net.rpc_from(&client, &echo, body.clone(), Duration::from_millis(50))
                .await
                .is_err()
        );
    }

    assert!(
        net.rpc_from(&client, &echo, body, Duration::from_secs(1))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_full_loss_rate_drops_everything() {
    let net = MemoryNet::new();
    let echo = spawn_echo_node(&net, "echo");
    let client = NodeId::new("c0");

    net.set_loss_rate(1.0);
    assert!(
        net.rpc_from(
            &client,
            &echo,
            serde_json::json!({"type": "probe"}),
            Duration::from_millis(50),
        )
        .await
        .is_err()
    );
}
