//! Bounded polls against the cluster
//!
//! Nothing here watches: each wait re-reads the resource on a fixed interval
//! until its condition holds or the timeout expires.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::client::StorageClient;
use crate::{Error, Result};

/// Interval and bound of one poll loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep between checks
    pub interval: Duration,
    /// Give up after this long
    pub timeout: Duration,
}

impl PollConfig {
    /// Create a poll config
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll `condition` until it yields `Ok(true)` or `poll.timeout` elapses.
///
/// `Ok(false)` keeps polling; `Err` aborts immediately. The condition is
/// always checked at least once.
pub async fn wait_for_condition<F, Fut>(description: &str, poll: PollConfig, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    loop {
        if condition().await? {
            return Ok(());
        }
        if start.elapsed() >= poll.timeout {
            return Err(Error::timeout(description, poll.timeout));
        }
        sleep(poll.interval).await;
    }
}

/// Wait for a claim to reach `phase` (e.g. "Bound").
///
/// Read errors are logged and polled through.
pub async fn wait_for_claim_phase(
    client: &dyn StorageClient,
    namespace: &str,
    name: &str,
    phase: &str,
    poll: PollConfig,
) -> Result<()> {
    info!(claim = %format!("{namespace}/{name}"), phase, timeout = ?poll.timeout, "waiting for claim phase");
    wait_for_condition(
        &format!("claim {namespace}/{name} to be {phase}"),
        poll,
        || async move {
            match client.get_claim(namespace, name).await {
                Ok(claim) => {
                    let current = claim
                        .status
                        .as_ref()
                        .and_then(|s| s.phase.as_deref())
                        .unwrap_or("Pending");
                    if current == phase {
                        info!(claim = %name, phase, "claim reached phase");
                        return Ok(true);
                    }
                    debug!(claim = %name, current, wanted = phase, "claim not in phase yet");
                    Ok(false)
                }
                Err(e) => {
                    warn!(claim = %name, error = %e, "failed to get claim, retrying");
                    Ok(false)
                }
            }
        },
    )
    .await
}

/// Wait for a pod to run to completion with phase `Succeeded`.
///
/// A `Failed` pod or a pod that disappears aborts the wait; other read
/// errors are logged and polled through.
pub async fn wait_for_pod_success(
    client: &dyn StorageClient,
    namespace: &str,
    name: &str,
    poll: PollConfig,
) -> Result<()> {
    info!(pod = %format!("{namespace}/{name}"), timeout = ?poll.timeout, "waiting for pod to succeed");
    wait_for_condition(
        &format!("pod {namespace}/{name} to succeed"),
        poll,
        || async move {
            let pod = match client.get_pod(namespace, name).await {
                Ok(pod) => pod,
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    warn!(pod = %name, error = %e, "failed to get pod, retrying");
                    return Ok(false);
                }
            };
            let status = pod.status.as_ref();
            match status.and_then(|s| s.phase.as_deref()) {
                Some("Succeeded") => {
                    info!(pod = %name, "pod succeeded");
                    Ok(true)
                }
                Some("Failed") => Err(Error::PodFailed {
                    name: name.to_string(),
                    reason: termination_reason(&pod),
                }),
                phase => {
                    debug!(pod = %name, phase = phase.unwrap_or("Unknown"), "pod not finished yet");
                    Ok(false)
                }
            }
        },
    )
    .await
}

/// Wait for a persistent volume to disappear.
///
/// The first delete attempts by the provisioner can fail while the node is
/// still detaching the volume, so a present volume and read errors both
/// just keep the poll going.
pub async fn wait_for_volume_deleted(
    client: &dyn StorageClient,
    name: &str,
    poll: PollConfig,
) -> Result<()> {
    info!(volume = %name, timeout = ?poll.timeout, "waiting for volume to be deleted");
    wait_for_condition(
        &format!("persistent volume {name} to be deleted"),
        poll,
        || async move {
            match client.get_volume(name).await {
                Ok(volume) => {
                    let phase = volume
                        .status
                        .as_ref()
                        .and_then(|s| s.phase.as_deref())
                        .unwrap_or("Unknown");
                    debug!(volume = %name, phase, "volume still present");
                    Ok(false)
                }
                Err(e) if e.is_not_found() => {
                    info!(volume = %name, "volume deleted");
                    Ok(true)
                }
                Err(e) => {
                    warn!(volume = %name, error = %e, "failed to get volume, ignoring");
                    Ok(false)
                }
            }
        },
    )
    .await
}

/// Describe why a pod's container terminated, for failure messages.
fn termination_reason(pod: &k8s_openapi::api::core::v1::Pod) -> String {
    let terminated = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|cs| cs.iter().find_map(|c| c.state.as_ref()?.terminated.as_ref()));

    match terminated {
        Some(t) => format!(
            "container exited with code {} ({})",
            t.exit_code,
            t.reason.as_deref().unwrap_or("no reason")
        ),
        None => pod
            .status
            .as_ref()
            .and_then(|s| s.message.clone())
            .unwrap_or_else(|| "phase Failed".to_string()),
    }
}
