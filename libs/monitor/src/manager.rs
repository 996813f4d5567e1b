//! Monitor Manager (C6): owns the global subscription table and routes MCP
//! subscribe calls to subscription URIs (SPEC_FULL.md §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::k8s::ClientFactory;
use crate::mcp::{Notifier, Session};
use crate::metrics::MonitorMetrics;
use crate::model::{ClusterDeploymentRef, ProgressUpdate};
use crate::phase::detect_phase;
use crate::progress::build_initial_snapshot;
use crate::subscription::{self, SubscriptionHandle};
use crate::uri;
use crate::watch::snapshot_of;

/// Key the table by `(session-id, namespace, name)` so a duplicate
/// `Subscribe` returns the existing handle (I1).
type TableKey = (String, String, String);

struct Entry {
    handle: Option<SubscriptionHandle>,
}

struct Inner {
    table: HashMap<TableKey, Entry>,
    per_session_counts: HashMap<String, usize>,
    global_count: usize,
}

/// Result of a successful `Subscribe`: a stable id the caller can present
/// back to `Unsubscribe`.
#[derive(Clone, Debug)]
pub struct SubscribeResult {
    pub subscription_id: String,
}

pub struct MonitorManager {
    inner: Mutex<Inner>,
    client: Arc<dyn ClientFactory>,
    notifier: Arc<dyn Notifier>,
    config: Arc<MonitorConfig>,
    metrics: Arc<MonitorMetrics>,
}

impl MonitorManager {
    pub fn new(
        client: Arc<dyn ClientFactory>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
        metrics: Arc<MonitorMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                table: HashMap::new(),
                per_session_counts: HashMap::new(),
                global_count: 0,
            }),
            client,
            notifier,
            config: Arc::new(config),
            metrics,
        })
    }

    pub async fn subscribe(
        self: &Arc<Self>,
        session: &dyn Session,
        raw_uri: &str,
    ) -> Result<SubscribeResult> {
        let parsed = uri::parse(raw_uri)?;
        let cd_ref = parsed.cd_ref;

        if !session.namespace_allowed(&cd_ref.namespace) {
            self.metrics.record_subscribe_error("permission_denied");
            return Err(Error::PermissionDenied {
                namespace: cd_ref.namespace,
            });
        }

        let key = (
            session.session_id().to_string(),
            cd_ref.namespace.clone(),
            cd_ref.name.clone(),
        );

        // I2: the check-then-insert critical section covers cap enforcement
        // and the duplicate-subscribe short-circuit in one lock acquisition.
        // The table entry itself is the reservation: it is inserted before
        // the `await` points below (the Get call and the spawn), so a
        // concurrent Subscribe for the same key must be rejected as soon as
        // the entry exists, not only once its handle has been filled in —
        // otherwise two callers can race between reservation and handle
        // assignment and both fall through to insert/count/spawn.
        let subscription_id = {
            let mut inner = self.inner.lock().expect("monitor manager mutex poisoned");
            if inner.table.contains_key(&key) {
                return Ok(SubscribeResult {
                    subscription_id: format!("{}/{}/{}", key.0, key.1, key.2),
                });
            }

            let session_count = *inner.per_session_counts.get(&key.0).unwrap_or(&0);
            if session_count >= self.config.per_client_cap {
                self.metrics.record_subscribe_error("resource_exhausted");
                return Err(Error::ResourceExhausted(format!(
                    "session {} has reached its subscription cap ({})",
                    key.0, self.config.per_client_cap
                )));
            }
            if inner.global_count >= self.config.global_cap {
                self.metrics.record_subscribe_error("resource_exhausted");
                return Err(Error::ResourceExhausted(format!(
                    "global subscription cap reached ({})",
                    self.config.global_cap
                )));
            }

            inner.table.insert(key.clone(), Entry { handle: None });
            *inner.per_session_counts.entry(key.0.clone()).or_insert(0) += 1;
            inner.global_count += 1;

            format!("{}/{}/{}", key.0, key.1, key.2)
        };

        match self
            .client
            .get_cluster_deployment(&cd_ref.namespace, &cd_ref.name)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.rollback_reservation(&key);
                self.metrics.record_subscribe_error("not_found");
                return Err(Error::NotFound(cd_ref));
            }
            Err(e) => {
                self.rollback_reservation(&key);
                self.metrics.record_subscribe_error("kube");
                return Err(e);
            }
        };

        let manager = Arc::clone(self);
        let remove_key = key.clone();
        let handle = subscription::spawn(
            subscription_id.clone(),
            cd_ref.clone(),
            parsed.timeout.unwrap_or(self.config.default_timeout),
            self.client.clone(),
            self.notifier.clone(),
            self.config.clone(),
            self.metrics.clone(),
            move |_id| manager.on_subscription_closed(remove_key),
        );

        {
            let mut inner = self.inner.lock().expect("monitor manager mutex poisoned");
            if let Some(entry) = inner.table.get_mut(&key) {
                entry.handle = Some(handle);
            }
        }

        self.metrics.record_subscribed();
        Ok(SubscribeResult { subscription_id })
    }

    fn rollback_reservation(&self, key: &TableKey) {
        let mut inner = self.inner.lock().expect("monitor manager mutex poisoned");
        inner.table.remove(key);
        if let Some(count) = inner.per_session_counts.get_mut(&key.0) {
            *count = count.saturating_sub(1);
        }
        inner.global_count = inner.global_count.saturating_sub(1);
    }

    fn on_subscription_closed(&self, key: TableKey) {
        let mut inner = self.inner.lock().expect("monitor manager mutex poisoned");
        inner.table.remove(&key);
        if let Some(count) = inner.per_session_counts.get_mut(&key.0) {
            *count = count.saturating_sub(1);
        }
        inner.global_count = inner.global_count.saturating_sub(1);
    }

    /// Idempotent; waits (bounded) for the driver to reach `Closed` before
    /// returning (I3).
    pub async fn unsubscribe(&self, session_id: &str, namespace: &str, name: &str) {
        let key = (session_id.to_string(), namespace.to_string(), name.to_string());
        let handle = {
            let mut inner = self.inner.lock().expect("monitor manager mutex poisoned");
            inner.table.get_mut(&key).and_then(|entry| entry.handle.take())
        };
        if let Some(handle) = handle {
            handle.unsubscribe().await;
        }
    }

    /// One-shot, non-subscribing state read (§4.6). Runs the same Get +
    /// phase-detection pipeline Subscribe uses for its initial snapshot.
    pub async fn get_state(
        &self,
        session: &dyn Session,
        namespace: &str,
        name: &str,
    ) -> Result<ProgressUpdate> {
        if !session.namespace_allowed(namespace) {
            return Err(Error::PermissionDenied {
                namespace: namespace.to_string(),
            });
        }

        let cd = self
            .client
            .get_cluster_deployment(namespace, name)
            .await?
            .ok_or_else(|| Error::NotFound(ClusterDeploymentRef::new(namespace, name)))?;

        let snapshot = snapshot_of(&cd);
        let (phase, percent) = detect_phase(&snapshot);
        Ok(build_initial_snapshot(phase, percent))
    }

    /// Iterates a disconnected session's subscriptions and unsubscribes
    /// each, per §4.6 "Session disconnect".
    pub async fn handle_session_disconnect(&self, session_id: &str) {
        let keys: Vec<TableKey> = {
            let inner = self.inner.lock().expect("monitor manager mutex poisoned");
            inner
                .table
                .keys()
                .filter(|k| k.0 == session_id)
                .cloned()
                .collect()
        };
        for (_, namespace, name) in keys {
            self.unsubscribe(session_id, &namespace, &name).await;
        }
    }

    pub fn active_subscription_count(&self) -> usize {
        self.inner.lock().expect("monitor manager mutex poisoned").global_count
    }

    /// Cancels every live subscription and awaits each one reaching `Closed`
    /// before returning, per §9 "Global state": the table is process-wide
    /// state, torn down on server shutdown. Called from the binary's `main`
    /// after the HTTP server itself has stopped accepting new work.
    pub async fn shutdown(&self) {
        let keys: Vec<TableKey> = {
            let inner = self.inner.lock().expect("monitor manager mutex poisoned");
            inner.table.keys().cloned().collect()
        };
        for (session_id, namespace, name) in keys {
            self.unsubscribe(&session_id, &namespace, &name).await;
        }
    }
}
