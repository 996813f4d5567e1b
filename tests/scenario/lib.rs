//! End-to-end scenario tests for the monitoring core, driven through the
//! public API rather than a live cluster: a literal-input/expected-output
//! suite matching the six scenarios in SPEC_FULL.md's testable-properties
//! section, plus fakes for the Kubernetes client factory, MCP session and
//! notifier that the production binary otherwise supplies.
//!
//! Structured as a separate workspace member, gated by `scenario-tests`,
//! mirroring the teacher's own `e2e-tests`-gated integration crate: slower,
//! cross-module tests live apart from each module's own unit tests.

#[cfg(all(test, feature = "scenario-tests"))]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use futures::stream::{self, BoxStream};
    use kube::api::ObjectMeta;

    use k0rdent_mcp_monitor::crd::{ClusterDeployment, ClusterDeploymentSpec, ClusterDeploymentStatus, RawCondition};
    use k0rdent_mcp_monitor::error::Result;
    use k0rdent_mcp_monitor::k8s::{CdWatchEvent, ClientFactory, EventWatchEvent};
    use k0rdent_mcp_monitor::mcp::{NotifyError, Notifier, Session};
    use k0rdent_mcp_monitor::manager::MonitorManager;
    use k0rdent_mcp_monitor::metrics::MonitorMetrics;
    use k0rdent_mcp_monitor::model::{
        ClusterDeploymentSnapshot, Condition, ConditionStatus, EventRecord, EventType, Phase,
        ProgressUpdate, Severity,
    };
    use k0rdent_mcp_monitor::subscription::{DecisionInput, SubscriptionRuntime};
    use k0rdent_mcp_monitor::MonitorConfig;

    fn cond(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: Utc::now(),
        }
    }

    fn snapshot(conditions: Vec<Condition>) -> ClusterDeploymentSnapshot {
        ClusterDeploymentSnapshot {
            resource_version: "1".to_string(),
            conditions,
        }
    }

    fn event(reason: &str, kind: &str, name: &str, ns: &str, uid: &str, type_: EventType) -> EventRecord {
        EventRecord {
            uid: uid.to_string(),
            reason: reason.to_string(),
            message: String::new(),
            type_,
            involved_kind: kind.to_string(),
            involved_name: name.to_string(),
            involved_namespace: ns.to_string(),
            count: 1,
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    // ---------------------------------------------------------------
    // S1: Happy path, short provisioning.
    // ---------------------------------------------------------------
    #[test]
    fn s1_happy_path_short_provisioning() {
        let cfg = MonitorConfig::default();
        let mut runtime = SubscriptionRuntime::new("demo", "my-cluster", &cfg);

        let initial = snapshot(vec![cond(
            "Ready",
            ConditionStatus::False,
            "Waiting",
            "InfrastructureReady: group creating or updating",
        )]);
        let start_update = runtime.start(&initial);
        assert_eq!(start_update.phase, Phase::Provisioning);
        assert!(!start_update.terminal);

        // Six provisioning heartbeats of the same reason/kind collapse to at
        // most one emit under Stage 3's dedup (60s window for
        // "CAPIClusterIsProvisioning"; all six land in the same instant).
        let mut heartbeat_emits = 0;
        for i in 0..6 {
            let ev = event(
                "CAPIClusterIsProvisioning",
                "Cluster",
                "my-cluster",
                "demo",
                &format!("hb-{i}"),
                EventType::Normal,
            );
            if runtime.decide(DecisionInput::Event(ev)).is_some() {
                heartbeat_emits += 1;
            }
        }
        assert!(heartbeat_emits <= 1, "heartbeats must collapse under dedup");

        let infra_ready = snapshot(vec![cond(
            "Ready",
            ConditionStatus::False,
            "Waiting",
            "InfrastructureReady is now True",
        )]);
        let bootstrapping = runtime
            .decide(DecisionInput::ConditionChange(infra_ready))
            .expect("bootstrapping transition must emit");
        assert_eq!(bootstrapping.phase, Phase::Bootstrapping);

        let cp_ready = snapshot(vec![cond(
            "Ready",
            ConditionStatus::False,
            "Waiting",
            "ControlPlaneReady is now True",
        )]);
        let scaling = runtime
            .decide(DecisionInput::ConditionChange(cp_ready))
            .expect("scaling transition must emit");
        assert_eq!(scaling.phase, Phase::Scaling);

        let one_worker = snapshot(vec![cond(
            "Ready",
            ConditionStatus::False,
            "Waiting",
            "WorkersAvailable: 1+ available replicas",
        )]);
        let ready_pending = runtime
            .decide(DecisionInput::ConditionChange(one_worker))
            .expect("ready-pending transition must emit");
        assert_eq!(ready_pending.phase, Phase::Ready);
        assert!(ready_pending.terminal, "Ready is terminal per I5/P2");

        // The subscription has already drained; nothing further is emitted.
        let succeeded = snapshot(vec![cond(
            "Ready",
            ConditionStatus::True,
            "Succeeded",
            "Object is ready",
        )]);
        assert!(runtime
            .decide(DecisionInput::ConditionChange(succeeded))
            .is_none());
    }

    // ---------------------------------------------------------------
    // S2: Noise suppression.
    // ---------------------------------------------------------------
    #[test]
    fn s2_noise_suppression_caps_emitted_updates() {
        let cfg = MonitorConfig::default();
        let mut runtime = SubscriptionRuntime::new("demo", "my-cluster", &cfg);
        let initial = snapshot(vec![cond(
            "Ready",
            ConditionStatus::False,
            "Waiting",
            "InfrastructureReady: group creating or updating",
        )]);
        runtime.start(&initial);

        let mut emitted = 0usize;
        let mut uid = 0usize;
        let mut push = |runtime: &mut SubscriptionRuntime, reason: &str, kind: &str| {
            let ev = event(reason, kind, "my-cluster", "demo", &format!("n{uid}"), EventType::Normal);
            uid += 1;
            if runtime.decide(DecisionInput::Event(ev)).is_some() {
                emitted += 1;
            }
        };

        for _ in 0..21 {
            push(&mut runtime, "ServiceSetCollectServiceStatusesFailed", "ServiceSet");
        }
        for _ in 0..15 {
            push(&mut runtime, "ClusterReconcilerNormalFailed", "ClusterDeployment");
        }
        for _ in 0..60 {
            push(&mut runtime, "ArtifactUpToDate", "HelmRelease");
        }
        for i in 0..14 {
            let reason = match i % 3 {
                0 => "SuccessfulCreate",
                1 => "InfrastructureReady",
                _ => "ControlPlaneReady",
            };
            let kind = match i % 3 {
                0 => "MachineDeployment",
                1 => "ClusterDeployment",
                _ => "KubeadmControlPlane",
            };
            push(&mut runtime, reason, kind);
        }

        assert!(emitted <= 15, "suppressed/noisy trace must emit <= 15 updates, got {emitted}");
    }

    // ---------------------------------------------------------------
    // S3: Terminal failure.
    // ---------------------------------------------------------------
    #[test]
    fn s3_terminal_failure_closes_subscription() {
        let cfg = MonitorConfig::default();
        let mut runtime = SubscriptionRuntime::new("demo", "my-cluster", &cfg);
        let initial = snapshot(vec![cond(
            "Ready",
            ConditionStatus::False,
            "Waiting",
            "creating or updating network",
        )]);
        runtime.start(&initial);

        let failed = snapshot(vec![cond(
            "Ready",
            ConditionStatus::False,
            "QuotaExceeded",
            "Insufficient regional quota",
        )]);
        let update = runtime
            .decide(DecisionInput::ConditionChange(failed))
            .expect("failure must emit");
        assert_eq!(update.phase, Phase::Failed);
        assert_eq!(update.severity, Severity::Error);
        assert!(update.terminal);

        // Subsequent CD updates are ignored: the driver transitions to
        // Draining/Closed and `decide` becomes a no-op.
        runtime.state = k0rdent_mcp_monitor::subscription::SubscriptionState::Closed;
        let after = snapshot(vec![cond(
            "Ready",
            ConditionStatus::True,
            "Succeeded",
            "Object is ready",
        )]);
        assert!(runtime.decide(DecisionInput::ConditionChange(after)).is_none());
    }

    // ---------------------------------------------------------------
    // S4: Timeout.
    // ---------------------------------------------------------------
    #[test]
    fn s4_timeout_warns_then_closes() {
        let cfg = MonitorConfig::default();
        let mut runtime = SubscriptionRuntime::new("demo", "my-cluster", &cfg);
        let initial = snapshot(vec![]);
        runtime.start(&initial);

        let warning = runtime
            .decide(DecisionInput::TimeoutWarning)
            .expect("T-5min warning must emit");
        assert_eq!(warning.severity, Severity::Warning);
        assert!(!warning.terminal);
        assert_eq!(warning.message, "Provisioning timeout approaching");

        let exceeded = runtime
            .decide(DecisionInput::TimeoutExceeded)
            .expect("T timeout must emit");
        assert_eq!(exceeded.severity, Severity::Error);
        assert!(exceeded.terminal);
        assert_eq!(exceeded.message, "Monitoring timeout exceeded");
    }

    // ---------------------------------------------------------------
    // Fakes for the manager-level scenarios (S5, S6).
    // ---------------------------------------------------------------

    fn fake_cd(namespace: &str, name: &str, resource_version: &str, conditions: Vec<RawCondition>) -> ClusterDeployment {
        ClusterDeployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(resource_version.to_string()),
                ..Default::default()
            },
            spec: ClusterDeploymentSpec::default(),
            status: Some(ClusterDeploymentStatus { conditions }),
        }
    }

    struct FakeSession {
        id: String,
    }

    impl Session for FakeSession {
        fn session_id(&self) -> &str {
            &self.id
        }
        fn namespace_filter(&self) -> Option<&regex::Regex> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        updates: Mutex<Vec<ProgressUpdate>>,
    }

    impl RecordingNotifier {
        fn snapshot(&self) -> Vec<ProgressUpdate> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, _handle: &str, payload: &ProgressUpdate) -> std::result::Result<(), NotifyError> {
            self.updates.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    /// A `ClientFactory` whose CD watch stream closes after its first item on
    /// the first call (simulating a transient disconnect) and redelivers the
    /// same object, unchanged, on the reconnect.
    struct ReconnectingClientFactory {
        cd: ClusterDeployment,
        watch_calls: AtomicUsize,
    }

    #[async_trait]
    impl ClientFactory for ReconnectingClientFactory {
        async fn get_cluster_deployment(&self, _ns: &str, _name: &str) -> Result<Option<ClusterDeployment>> {
            Ok(Some(self.cd.clone()))
        }

        fn watch_cluster_deployment(&self, _ns: &str, _name: &str) -> BoxStream<'static, Result<CdWatchEvent>> {
            let call = self.watch_calls.fetch_add(1, Ordering::SeqCst);
            let cd = self.cd.clone();
            if call == 0 {
                // First attempt: one item, then the stream ends (closure).
                Box::pin(stream::iter(vec![Ok(CdWatchEvent::Applied(cd))]))
            } else {
                // Reconnect: redeliver the same object, then hang forever so
                // no further reconnection is triggered.
                let redelivered = stream::iter(vec![Ok(CdWatchEvent::Applied(cd))]);
                Box::pin(redelivered.chain(stream::pending()))
            }
        }

        fn watch_events(&self, _ns: &str) -> BoxStream<'static, Result<EventWatchEvent>> {
            Box::pin(stream::pending())
        }
    }

    // ---------------------------------------------------------------
    // S5: Watch reconnect.
    // ---------------------------------------------------------------
    #[tokio::test(flavor = "multi_thread")]
    async fn s5_watch_reconnect_does_not_duplicate_or_error() {
        let cd = fake_cd(
            "demo",
            "my-cluster",
            "rv1",
            vec![RawCondition {
                type_: "Ready".to_string(),
                status: "False".to_string(),
                reason: "Waiting".to_string(),
                message: "creating or updating network".to_string(),
                last_transition_time: None,
            }],
        );
        let client = Arc::new(ReconnectingClientFactory {
            cd,
            watch_calls: AtomicUsize::new(0),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = MonitorConfig::default();
        cfg.reconnect_backoff_base = Duration::from_millis(10);
        let metrics = Arc::new(MonitorMetrics::default());
        let manager = MonitorManager::new(client, notifier.clone(), cfg, metrics);

        let session = FakeSession { id: "s1".to_string() };
        manager
            .subscribe(&session, "k0rdent://cluster-monitor/demo/my-cluster")
            .await
            .expect("subscribe must succeed");

        // Give the driver time to process the initial Get, the first watch
        // closure, the reconnect backoff and the redelivered item.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let updates = notifier.snapshot();
        assert_eq!(updates.len(), 1, "reconnect must not duplicate the initial snapshot: {updates:?}");
        assert!(
            updates.iter().all(|u| u.severity != Severity::Error),
            "a transient reconnect must not surface an error-severity update"
        );
    }

    /// A `ClientFactory` that always succeeds and never produces watch
    /// traffic, for tests that only exercise `Subscribe`'s cap accounting.
    struct StaticClientFactory;

    #[async_trait]
    impl ClientFactory for StaticClientFactory {
        async fn get_cluster_deployment(&self, namespace: &str, name: &str) -> Result<Option<ClusterDeployment>> {
            Ok(Some(fake_cd(namespace, name, "1", vec![])))
        }

        fn watch_cluster_deployment(&self, _ns: &str, _name: &str) -> BoxStream<'static, Result<CdWatchEvent>> {
            Box::pin(stream::pending())
        }

        fn watch_events(&self, _ns: &str) -> BoxStream<'static, Result<EventWatchEvent>> {
            Box::pin(stream::pending())
        }
    }

    // ---------------------------------------------------------------
    // S6: Cap exhaustion.
    // ---------------------------------------------------------------
    #[tokio::test(flavor = "multi_thread")]
    async fn s6_cap_exhaustion_rejects_eleventh_subscribe() {
        let client = Arc::new(StaticClientFactory);
        let notifier = Arc::new(RecordingNotifier::default());
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.per_client_cap, 10);
        let metrics = Arc::new(MonitorMetrics::default());
        let manager = MonitorManager::new(client, notifier, cfg, metrics);
        let session = FakeSession { id: "s1".to_string() };

        for i in 0..10 {
            let uri = format!("k0rdent://cluster-monitor/demo/cluster-{i}");
            manager
                .subscribe(&session, &uri)
                .await
                .unwrap_or_else(|e| panic!("subscribe #{i} should succeed: {e}"));
        }

        let eleventh = manager
            .subscribe(&session, "k0rdent://cluster-monitor/demo/cluster-10")
            .await;
        assert!(
            matches!(eleventh, Err(k0rdent_mcp_monitor::error::Error::ResourceExhausted(_))),
            "the 11th subscribe must fail with ResourceExhausted, got {eleventh:?}"
        );

        assert_eq!(manager.active_subscription_count(), 10, "existing subscriptions must be unaffected (P4)");
    }

    // ---------------------------------------------------------------
    // P9: GetState round-trips Subscribe's initial snapshot.
    // ---------------------------------------------------------------
    #[tokio::test(flavor = "multi_thread")]
    async fn p9_get_state_matches_subscribe_initial_snapshot() {
        let cd = fake_cd(
            "demo",
            "my-cluster",
            "1",
            vec![RawCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                reason: "Succeeded".to_string(),
                message: "Object is ready".to_string(),
                last_transition_time: None,
            }],
        );
        let client = Arc::new(ReconnectingClientFactory {
            cd,
            watch_calls: AtomicUsize::new(0),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let cfg = MonitorConfig::default();
        let metrics = Arc::new(MonitorMetrics::default());
        let manager = MonitorManager::new(client, notifier.clone(), cfg, metrics);
        let session = FakeSession { id: "s1".to_string() };

        manager
            .subscribe(&session, "k0rdent://cluster-monitor/demo/my-cluster")
            .await
            .expect("subscribe must succeed");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let get_state = manager
            .get_state(&session, "demo", "my-cluster")
            .await
            .expect("get_state must succeed");

        let subscribe_initial = notifier.snapshot().into_iter().next().expect("an initial snapshot was emitted");
        assert!(
            get_state.eq_ignoring_timestamp(&subscribe_initial),
            "GetState must match Subscribe's initial snapshot modulo timestamp: {get_state:?} vs {subscribe_initial:?}"
        );
    }
}
