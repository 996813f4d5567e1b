//! Prometheus metrics for the monitoring subsystem, registered under the
//! `k0rdent_mcp_monitor` prefix. Shape follows the teacher's
//! `ReconcileMetrics`: one struct of `Family`/`Counter`/`Histogram` fields,
//! a `register` that wires them into a `Registry`, and small helper methods
//! called from the hot paths (C3/C5/C6) rather than scattering `.inc()`
//! calls across the subsystem.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone)]
pub struct MonitorMetrics {
    pub active_subscriptions: Gauge,
    pub subscriptions_created: Counter,
    pub subscriptions_closed: Family<CloseReasonLabel, Counter>,
    pub events_received: Counter,
    pub events_filtered: Family<FilterStageLabel, Counter>,
    pub progress_updates_emitted: Family<ProgressLabel, Counter>,
    pub watch_reconnects: Family<WatchKindLabel, Counter>,
    pub notifier_retries: Counter,
    pub subscribe_errors: Family<ErrorLabel, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
pub struct CloseReasonLabel {
    pub reason: String,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
pub struct FilterStageLabel {
    pub stage: String,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
pub struct ProgressLabel {
    pub phase: String,
    pub severity: String,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
pub struct WatchKindLabel {
    pub kind: String,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
pub struct ErrorLabel {
    pub error: String,
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self {
            active_subscriptions: Gauge::default(),
            subscriptions_created: Counter::default(),
            subscriptions_closed: Family::<CloseReasonLabel, Counter>::default(),
            events_received: Counter::default(),
            events_filtered: Family::<FilterStageLabel, Counter>::default(),
            progress_updates_emitted: Family::<ProgressLabel, Counter>::default(),
            watch_reconnects: Family::<WatchKindLabel, Counter>::default(),
            notifier_retries: Counter::default(),
            subscribe_errors: Family::<ErrorLabel, Counter>::default(),
        }
    }
}

impl MonitorMetrics {
    /// Registers every metric under `r`, under the `k0rdent_mcp_monitor` prefix.
    /// Mirrors the teacher's `ReconcileMetrics::register`: the caller owns the
    /// `Registry` (and its OpenMetrics text encoding), this just wires into it.
    pub fn register(self, r: &mut Registry) -> Self {
        let mut sub = r.sub_registry_with_prefix("k0rdent_mcp_monitor");

        sub.register(
            "active_subscriptions",
            "subscriptions currently Running or Draining",
            self.active_subscriptions.clone(),
        );
        sub.register(
            "subscriptions_created",
            "subscriptions successfully started",
            self.subscriptions_created.clone(),
        );
        sub.register(
            "subscriptions_closed",
            "subscriptions that reached Closed, by reason",
            self.subscriptions_closed.clone(),
        );
        sub.register(
            "events_received",
            "Kubernetes Events observed across all subscriptions",
            self.events_received.clone(),
        );
        sub.register(
            "events_filtered",
            "Events or condition changes dropped, by pipeline stage",
            self.events_filtered.clone(),
        );
        sub.register(
            "progress_updates_emitted",
            "ProgressUpdates delivered to the MCP notifier",
            self.progress_updates_emitted.clone(),
        );
        sub.register(
            "watch_reconnects",
            "watch stream reconnection attempts",
            self.watch_reconnects.clone(),
        );
        sub.register(
            "notifier_retries",
            "MCP notifier retry attempts",
            self.notifier_retries.clone(),
        );
        sub.register(
            "subscribe_errors",
            "Subscribe/GetState calls rejected, by error kind",
            self.subscribe_errors.clone(),
        );

        self
    }

    pub fn record_subscribed(&self) {
        self.subscriptions_created.inc();
        self.active_subscriptions.inc();
    }

    pub fn record_closed(&self, reason: &str) {
        self.active_subscriptions.dec();
        self.subscriptions_closed
            .get_or_create(&CloseReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_filtered(&self, stage: &str) {
        self.events_filtered
            .get_or_create(&FilterStageLabel {
                stage: stage.to_string(),
            })
            .inc();
    }

    pub fn record_emitted(&self, phase: &str, severity: &str) {
        self.progress_updates_emitted
            .get_or_create(&ProgressLabel {
                phase: phase.to_string(),
                severity: severity.to_string(),
            })
            .inc();
    }

    pub fn record_reconnect(&self, kind: &str) {
        self.watch_reconnects
            .get_or_create(&WatchKindLabel {
                kind: kind.to_string(),
            })
            .inc();
    }

    pub fn record_subscribe_error(&self, label: &str) {
        self.subscribe_errors
            .get_or_create(&ErrorLabel {
                error: label.to_string(),
            })
            .inc();
    }
}
