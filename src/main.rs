use std::sync::Arc;
use std::time::Duration;

use cluster_broadcast::broadcast::protocol::{Value, WireMessage};
use cluster_broadcast::broadcast::service::{BroadcastConfig, BroadcastService, DisseminationMode};
use cluster_broadcast::transport::memory::MemoryNet;
use cluster_broadcast::transport::types::NodeId;

/// Submission/read attempts for the synthetic client. The client sits outside
/// the engine, so it carries its own small retry loop against a lossy net.
const CLIENT_ATTEMPTS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut node_count: usize = 3;
    let mut value_count: Value = 12;
    let mut loss_rate: f64 = 0.0;
    let mut eager = false;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--nodes" => {
                node_count = args[i + 1].parse()?;
                i += 2;
            }
            "--values" => {
                value_count = args[i + 1].parse()?;
                i += 2;
            }
            "--loss" => {
                loss_rate = args[i + 1].parse()?;
                i += 2;
            }
            "--eager" => {
                eager = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    if node_count == 0 {
        eprintln!("Usage: cluster-broadcast [--nodes N] [--values K] [--loss P] [--eager]");
        std::process::exit(1);
    }

    let config = BroadcastConfig {
        mode: if eager {
            DisseminationMode::Eager
        } else {
            DisseminationMode::Batched
        },
        ..BroadcastConfig::default()
    };

    let net = MemoryNet::new();
    net.set_loss_rate(loss_rate);

    // 1. Bring the cluster up:
    let mut services = Vec::new();
    for n in 0..node_count {
        let (transport, inbox) = net.join(NodeId::new(format!("n{}", n)));
        let service = BroadcastService::new(Arc::new(transport), config.clone());
        service.start(inbox);
        services.push(service);
    }

    tracing::info!(
        "Cluster up: {} nodes, {:?} mode, loss rate {}",
        node_count,
        config.mode,
        loss_rate
    );

    // 2. Submit values round-robin from a synthetic client:
    let client = NodeId::new("client");
    let members = net.member_ids();
    let body = |value: Value| serde_json::json!({"type": "broadcast", "message": value});

    for value in 0..value_count {
        let dest = &members[(value as usize) % members.len()];
        let mut submitted = false;
        for _ in 0..CLIENT_ATTEMPTS {
            if net
                .rpc_from(&client, dest, body(value), Duration::from_secs(1))
                .await
                .is_ok()
            {
                submitted = true;
                break;
            }
        }
        if submitted {
            tracing::debug!("Submitted {} to {}", value, dest);
        } else {
            tracing::warn!("Gave up submitting {} to {}", value, dest);
        }
    }

    // 3. Let the dissemination run a few rounds:
    let settle = if eager {
        Duration::from_secs(1)
    } else {
        config.flush_interval * 4
    };
    tracing::info!("Waiting {:?} for convergence", settle);
    tokio::time::sleep(settle).await;

    // 4. Ask every node what it has seen:
    let mut converged = true;
    for member in &members {
        let mut seen: Option<Vec<Value>> = None;
        for _ in 0..CLIENT_ATTEMPTS {
            let reply = net
                .rpc_from(
                    &client,
                    member,
                    serde_json::json!({"type": "read"}),
                    Duration::from_secs(1),
                )
                .await;

            if let Ok(reply) = reply
                && let Ok(WireMessage::ReadOk { messages }) = serde_json::from_value(reply)
            {
                seen = Some(messages);
                break;
            }
        }

        match seen {
            Some(messages) => {
                let complete = messages.len() as Value == value_count;
                if !complete {
                    converged = false;
                }
                tracing::info!(
                    "{}: {}/{} values{}",
                    member,
                    messages.len(),
                    value_count,
                    if complete { "" } else { " (incomplete)" }
                );
            }
            None => {
                converged = false;
                tracing::warn!("{}: read failed", member);
            }
        }
    }

    if !converged {
        tracing::warn!("Cluster did not converge");
        std::process::exit(1);
    }

    tracing::info!("All {} nodes converged on {} values", node_count, value_count);
    Ok(())
}
