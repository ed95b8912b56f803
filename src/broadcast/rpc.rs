use std::time::Duration;

use anyhow::Result;

use crate::transport::Transport;
use crate::transport::types::NodeId;

/// Base delay between attempts; the actual sleep is this times the 0-based
/// index of the failed attempt, so the first retry goes out immediately.
/// Linear rather than exponential: convergence speed was valued over strict
/// backoff discipline.
pub const BACKOFF_UNIT: Duration = Duration::from_millis(100);

/// Issues a synchronous call and retries it until it is acknowledged or the
/// attempt budget runs out, sleeping `BACKOFF_UNIT * attempt` between
/// attempts. Returns the first reply, or the last observed failure.
pub async fn rpc_with_retry<T>(
    transport: &T,
    dest: &NodeId,
    body: &serde_json::Value,
    attempts: u32,
    timeout: Duration,
) -> Result<serde_json::Value>
where
    T: Transport + ?Sized,
{
    for attempt in 0..attempts {
        match transport.rpc(dest, body.clone(), timeout).await {
            Ok(reply) => {
                if attempt > 0 {
                    tracing::debug!("rpc to {} succeeded on attempt {}", dest, attempt + 1);
                }
                return Ok(reply);
            }
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(e);
                }
                tracing::trace!("rpc to {} failed on attempt {}: {}", dest, attempt + 1, e);
                tokio::time::sleep(BACKOFF_UNIT * attempt).await;
            }
        }
    }

    Err(anyhow::anyhow!("no rpc attempts budgeted for {}", dest))
}
