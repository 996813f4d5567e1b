//! Watch Sources (C1): wraps the external `ClientFactory`'s raw watch
//! streams with the reconnection policy from SPEC_FULL.md §4.1/§9
//! ("Retry structure") — exponential backoff (1s, 2s, 4s; 3 attempts)
//! independent of the MCP notifier's own retry loop in C5.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::crd::ClusterDeployment;
use crate::error::{Error, Result};
use crate::k8s::{CdWatchEvent, ClientFactory, EventWatchEvent};
use crate::metrics::MonitorMetrics;
use crate::model::ClusterDeploymentRef;

fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base * 2u32.pow(attempt.min(16))
}

/// Watch a single `ClusterDeployment`, reconnecting transparently on stream
/// termination or error. Emits a synthetic `CdWatchEvent::Deleted` if the
/// object is already missing at initial list time (so the driver can still
/// transition straight to Draining instead of waiting on a watch that will
/// never deliver anything).
pub fn cluster_deployment_stream(
    client: Arc<dyn ClientFactory>,
    cd_ref: ClusterDeploymentRef,
    max_attempts: u32,
    backoff_base: Duration,
    metrics: Arc<MonitorMetrics>,
) -> BoxStream<'static, Result<CdWatchEvent>> {
    let stream = async_stream::stream! {
        let mut attempt: u32 = 0;
        match client.get_cluster_deployment(&cd_ref.namespace, &cd_ref.name).await {
            Ok(Some(cd)) => yield Ok(CdWatchEvent::Applied(cd)),
            Ok(None) => {
                yield Ok(CdWatchEvent::Deleted);
                return;
            }
            Err(e) => {
                yield Err(e);
                return;
            }
        }

        loop {
            let mut inner = client.watch_cluster_deployment(&cd_ref.namespace, &cd_ref.name);
            let mut saw_item_this_attempt = false;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(ev) => {
                        attempt = 0;
                        saw_item_this_attempt = true;
                        yield Ok(ev);
                    }
                    Err(_) => break,
                }
            }
            drop(inner);

            if !saw_item_this_attempt {
                attempt += 1;
            }
            if attempt >= max_attempts {
                yield Err(Error::Unavailable {
                    ref_: cd_ref.clone(),
                    reason: format!(
                        "cluster deployment watch exhausted {max_attempts} reconnect attempts"
                    ),
                });
                return;
            }
            metrics.record_reconnect("cluster_deployment");
            tokio::time::sleep(backoff_delay(attempt - 1, backoff_base)).await;
        }
    };
    Box::pin(stream)
}

/// Watch all Events in a namespace, reconnecting the same way as
/// `cluster_deployment_stream`.
pub fn namespace_event_stream(
    client: Arc<dyn ClientFactory>,
    namespace: String,
    cd_ref: ClusterDeploymentRef,
    max_attempts: u32,
    backoff_base: Duration,
    metrics: Arc<MonitorMetrics>,
) -> BoxStream<'static, Result<EventWatchEvent>> {
    let stream = async_stream::stream! {
        let mut attempt: u32 = 0;
        loop {
            let mut inner = client.watch_events(&namespace);
            let mut saw_item_this_attempt = false;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(ev) => {
                        attempt = 0;
                        saw_item_this_attempt = true;
                        yield Ok(ev);
                    }
                    Err(_) => break,
                }
            }
            drop(inner);

            if !saw_item_this_attempt {
                attempt += 1;
            }
            if attempt >= max_attempts {
                yield Err(Error::Unavailable {
                    ref_: cd_ref.clone(),
                    reason: format!("event watch exhausted {max_attempts} reconnect attempts"),
                });
                return;
            }
            metrics.record_reconnect("events");
            tokio::time::sleep(backoff_delay(attempt - 1, backoff_base)).await;
        }
    };
    Box::pin(stream)
}

/// Build a `ClusterDeployment`'s snapshot from a live object, stamping the
/// `resourceVersion` used for the next reconnect.
pub fn snapshot_of(cd: &ClusterDeployment) -> crate::model::ClusterDeploymentSnapshot {
    use kube::ResourceExt;
    let rv = cd.resource_version().unwrap_or_default();
    cd.to_snapshot(rv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_attempt() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(0, base), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, base), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(4));
    }
}
