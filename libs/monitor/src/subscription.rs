//! Subscription (C5): one active monitor instance (SPEC_FULL.md §4.5).
//!
//! Split in two per the "coroutine control flow" design note (§9): a pure
//! `SubscriptionRuntime::decide` step — `(SubscriptionState, DecisionInput)
//! -> (SubscriptionState, Option<ProgressUpdate>)`, safe to unit-test without
//! a runtime — and an async `drive` loop that owns the actual four-way
//! selection and the MCP notifier retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::Instant as TokioInstant;

use crate::config::MonitorConfig;
use crate::filter::FilterState;
use crate::k8s::{CdWatchEvent, ClientFactory, EventWatchEvent};
use crate::mcp::{NotifyErrorKind, Notifier};
use crate::metrics::MonitorMetrics;
use crate::model::{ClusterDeploymentRef, EventRecord, Phase, ProgressUpdate, Severity, Source};
use crate::phase::detect_phase;
use crate::progress;
use crate::watch::{cluster_deployment_stream, namespace_event_stream, snapshot_of};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Starting,
    Running,
    Draining,
    Closed,
}

/// The three watch-derived input kinds plus lifecycle signals, per the
/// "Polymorphism over sources" design note: a tagged variant, not a trait
/// hierarchy.
#[derive(Clone, Debug)]
pub enum DecisionInput {
    ConditionChange(crate::model::ClusterDeploymentSnapshot),
    Event(EventRecord),
    Deleted,
    TimeoutWarning,
    TimeoutExceeded,
    Unsubscribe,
    WatchExhausted { which: &'static str },
}

/// The pure decision core of a subscription: `FilterState` plus the
/// lifecycle state, advanced one `DecisionInput` at a time.
pub struct SubscriptionRuntime {
    pub state: SubscriptionState,
    filter: FilterState,
}

impl SubscriptionRuntime {
    pub fn new(namespace: impl Into<String>, cluster_name: impl Into<String>, cfg: &MonitorConfig) -> Self {
        Self {
            state: SubscriptionState::Starting,
            filter: FilterState::new(
                namespace,
                cluster_name,
                cfg.rate_limit_burst,
                cfg.rate_limit_interval,
            ),
        }
    }

    /// Attach `MonitorMetrics` so the filter pipeline counts per-stage
    /// rejections (`events_filtered`). Used by the production driver
    /// (`spawn`); unit tests construct a runtime without metrics.
    pub fn with_metrics(mut self, metrics: Arc<MonitorMetrics>) -> Self {
        self.filter = self.filter.with_metrics(metrics);
        self
    }

    pub fn current_phase(&self) -> Phase {
        self.filter.current_phase()
    }

    /// The initial snapshot emitted on entering `Running` (§4.5).
    pub fn start(&mut self, initial: &crate::model::ClusterDeploymentSnapshot) -> ProgressUpdate {
        let (phase, percent) = detect_phase(initial);
        self.filter.set_current_phase(phase);
        self.state = SubscriptionState::Running;
        if phase.is_terminal() {
            self.state = SubscriptionState::Draining;
        }
        progress::build_initial_snapshot(phase, percent)
    }

    /// Advance the state machine by one input. Returns the update to emit,
    /// if any; `self.state` reflects the new lifecycle state after return.
    pub fn decide(&mut self, input: DecisionInput) -> Option<ProgressUpdate> {
        if self.state == SubscriptionState::Closed {
            return None;
        }

        match input {
            DecisionInput::Unsubscribe => {
                self.state = SubscriptionState::Draining;
                Some(progress::build_synthetic_termination(
                    self.filter.current_phase(),
                    Severity::Info,
                    "unsubscribed",
                ))
            }
            DecisionInput::Deleted => {
                self.state = SubscriptionState::Draining;
                Some(progress::build_synthetic_termination(
                    self.filter.current_phase(),
                    Severity::Warning,
                    "cluster deployment deleted",
                ))
            }
            DecisionInput::TimeoutWarning => Some(ProgressUpdate {
                timestamp: chrono::Utc::now(),
                phase: self.filter.current_phase(),
                progress: None,
                message: "Provisioning timeout approaching".to_string(),
                source: Source::Synthetic,
                severity: Severity::Warning,
                related_object: None,
                terminal: false,
            }),
            DecisionInput::TimeoutExceeded => {
                self.state = SubscriptionState::Draining;
                Some(ProgressUpdate {
                    timestamp: chrono::Utc::now(),
                    phase: self.filter.current_phase(),
                    progress: None,
                    message: "Monitoring timeout exceeded".to_string(),
                    source: Source::Synthetic,
                    severity: Severity::Error,
                    related_object: None,
                    terminal: true,
                })
            }
            DecisionInput::WatchExhausted { which } => {
                self.state = SubscriptionState::Draining;
                Some(progress::build_synthetic_termination(
                    self.filter.current_phase(),
                    Severity::Error,
                    &format!("{which} watch unavailable"),
                ))
            }
            DecisionInput::ConditionChange(snapshot) if self.state == SubscriptionState::Running => {
                let (phase, percent) = detect_phase(&snapshot);
                let is_terminal_failure = phase == Phase::Failed;
                let ready = snapshot.ready_condition();
                let reason = ready.map(|c| c.reason.as_str()).unwrap_or("");
                let message = ready.map(|c| c.message.clone());
                let candidate = self.filter.evaluate_condition(
                    phase,
                    percent,
                    reason,
                    message.clone(),
                    is_terminal_failure,
                    std::time::Instant::now(),
                )?;
                if candidate.phase.is_terminal() {
                    self.state = SubscriptionState::Draining;
                }
                Some(progress::build(&candidate, Source::Condition, message.as_deref()))
            }
            DecisionInput::Event(event) if self.state == SubscriptionState::Running => {
                let candidate = self.filter.evaluate_event(&event, std::time::Instant::now())?;
                if candidate.phase.is_terminal() {
                    self.state = SubscriptionState::Draining;
                }
                Some(progress::build(&candidate, Source::Event, None))
            }
            _ => None,
        }
    }
}

/// Handle returned to the manager: lets `Unsubscribe` signal cancellation
/// and wait (bounded) for the driver to reach `Closed`.
pub struct SubscriptionHandle {
    pub id: String,
    cancel_tx: watch::Sender<bool>,
    closed_rx: oneshot::Receiver<()>,
}

impl SubscriptionHandle {
    /// Idempotent: a second call observes the already-fired cancel signal.
    pub async fn unsubscribe(mut self) {
        let _ = self.cancel_tx.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut self.closed_rx).await;
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    id: String,
    cd_ref: ClusterDeploymentRef,
    timeout: Duration,
    client: Arc<dyn ClientFactory>,
    notifier: Arc<dyn Notifier>,
    cfg: Arc<MonitorConfig>,
    metrics: Arc<MonitorMetrics>,
    on_closed: impl FnOnce(String) + Send + 'static,
) -> SubscriptionHandle {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let (closed_tx, closed_rx) = oneshot::channel();
    let handle_id = id.clone();

    tokio::spawn(async move {
        let mut runtime = SubscriptionRuntime::new(cd_ref.namespace.clone(), cd_ref.name.clone(), &cfg)
            .with_metrics(metrics.clone());

        let mut cd_stream = cluster_deployment_stream(
            client.clone(),
            cd_ref.clone(),
            cfg.reconnect_max_attempts,
            cfg.reconnect_backoff_base,
            metrics.clone(),
        );
        let mut event_stream = namespace_event_stream(
            client.clone(),
            cd_ref.namespace.clone(),
            cd_ref.clone(),
            cfg.reconnect_max_attempts,
            cfg.reconnect_backoff_base,
            metrics.clone(),
        );

        let warning_deadline = TokioInstant::now() + timeout.saturating_sub(Duration::from_secs(300));
        let terminal_deadline = TokioInstant::now() + timeout;
        let mut warning_fired = false;

        // Starting: the stream's first item is always the initial Get,
        // performed lazily by `cluster_deployment_stream` itself. Entering
        // `Running` and emitting the initial snapshot happens here, before
        // the four-way selection begins, per §4.5.
        let initial_update = match futures::StreamExt::next(&mut cd_stream).await {
            Some(Ok(CdWatchEvent::Applied(cd))) => Some(runtime.start(&snapshot_of(&cd))),
            Some(Ok(CdWatchEvent::Deleted)) => {
                runtime.state = SubscriptionState::Draining;
                Some(progress::build_synthetic_termination(
                    Phase::Initializing,
                    Severity::Warning,
                    "cluster deployment not found at subscribe time",
                ))
            }
            Some(Err(_)) | None => {
                runtime.state = SubscriptionState::Draining;
                Some(progress::build_synthetic_termination(
                    Phase::Initializing,
                    Severity::Error,
                    "initial watch failed",
                ))
            }
        };
        if let Some(update) = initial_update {
            metrics.record_emitted(&update.phase.to_string(), severity_label(update.severity));
            notify_with_retry(&*notifier, &handle_id, &update).await;
        }

        while runtime.state != SubscriptionState::Draining {
            let update = tokio::select! {
                biased;

                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        runtime.decide(DecisionInput::Unsubscribe)
                    } else {
                        None
                    }
                }

                _ = tokio::time::sleep_until(warning_deadline), if !warning_fired => {
                    warning_fired = true;
                    runtime.decide(DecisionInput::TimeoutWarning)
                }

                _ = tokio::time::sleep_until(terminal_deadline) => {
                    runtime.decide(DecisionInput::TimeoutExceeded)
                }

                item = futures::StreamExt::next(&mut cd_stream) => {
                    match item {
                        Some(Ok(CdWatchEvent::Applied(cd))) => {
                            runtime.decide(DecisionInput::ConditionChange(snapshot_of(&cd)))
                        }
                        Some(Ok(CdWatchEvent::Deleted)) => runtime.decide(DecisionInput::Deleted),
                        Some(Err(_)) | None => {
                            runtime.decide(DecisionInput::WatchExhausted { which: "cluster deployment" })
                        }
                    }
                }

                item = futures::StreamExt::next(&mut event_stream) => {
                    match item {
                        Some(Ok(EventWatchEvent::Applied(ev))) => runtime.decide(DecisionInput::Event(ev)),
                        Some(Err(_)) | None => {
                            runtime.decide(DecisionInput::WatchExhausted { which: "events" })
                        }
                    }
                }
            };

            if let Some(update) = update {
                metrics.record_emitted(&update.phase.to_string(), severity_label(update.severity));
                notify_with_retry(&*notifier, &handle_id, &update).await;
            }

            if runtime.state == SubscriptionState::Draining {
                break;
            }
        }

        metrics.record_closed(close_reason(&runtime));
        on_closed(handle_id);
        let _ = closed_tx.send(());
    });

    SubscriptionHandle {
        id,
        cancel_tx,
        closed_rx,
    }
}

fn severity_label(s: Severity) -> &'static str {
    match s {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn close_reason(runtime: &SubscriptionRuntime) -> &'static str {
    match runtime.current_phase() {
        Phase::Ready => "ready",
        Phase::Failed => "failed",
        _ => "drained",
    }
}

/// MCP notify with the C5 retry policy: 100ms/200ms/400ms, up to 3 attempts,
/// independent of C1's reconnection backoff (§9, "Retry structure").
async fn notify_with_retry(notifier: &dyn Notifier, handle_id: &str, update: &ProgressUpdate) {
    let result = tryhard::retry_fn(|| async { notifier.notify(handle_id, update).await })
        .retries(3)
        .custom_backoff(|attempt, error: &crate::mcp::NotifyError| {
            if error.kind == NotifyErrorKind::NonRetryable {
                tryhard::RetryPolicy::Break
            } else {
                tryhard::RetryPolicy::Delay(Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1))))
            }
        })
        .await;

    if let Err(e) = result {
        tracing::warn!(subscription = handle_id, error = %e, "MCP notify failed; update dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, ConditionStatus};

    fn cfg() -> MonitorConfig {
        MonitorConfig::default()
    }

    fn snapshot_with_ready(status: ConditionStatus, reason: &str, message: &str) -> crate::model::ClusterDeploymentSnapshot {
        crate::model::ClusterDeploymentSnapshot {
            resource_version: "1".to_string(),
            conditions: vec![Condition {
                type_: "Ready".to_string(),
                status,
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: chrono::Utc::now(),
            }],
        }
    }

    #[test]
    fn start_emits_initial_snapshot_and_enters_running() {
        let mut runtime = SubscriptionRuntime::new("ns", "cluster", &cfg());
        let snap = snapshot_with_ready(ConditionStatus::False, "Waiting", "creating or updating network");
        let update = runtime.start(&snap);
        assert_eq!(runtime.state, SubscriptionState::Running);
        assert_eq!(update.phase, Phase::Provisioning);
    }

    #[test]
    fn terminal_condition_drains_the_subscription() {
        let mut runtime = SubscriptionRuntime::new("ns", "cluster", &cfg());
        let initial = snapshot_with_ready(ConditionStatus::False, "Waiting", "creating or updating network");
        runtime.start(&initial);

        let ready = snapshot_with_ready(ConditionStatus::True, "Succeeded", "Object is ready");
        let update = runtime
            .decide(DecisionInput::ConditionChange(ready))
            .expect("terminal update");
        assert!(update.terminal);
        assert_eq!(runtime.state, SubscriptionState::Draining);
    }

    #[test]
    fn decide_after_closed_is_a_no_op() {
        let mut runtime = SubscriptionRuntime::new("ns", "cluster", &cfg());
        runtime.state = SubscriptionState::Closed;
        assert!(runtime.decide(DecisionInput::Unsubscribe).is_none());
    }

    #[test]
    fn unsubscribe_emits_exactly_one_terminal_update() {
        let mut runtime = SubscriptionRuntime::new("ns", "cluster", &cfg());
        let initial = snapshot_with_ready(ConditionStatus::False, "Waiting", "creating or updating network");
        runtime.start(&initial);
        let update = runtime.decide(DecisionInput::Unsubscribe).unwrap();
        assert!(update.terminal);
        assert_eq!(runtime.state, SubscriptionState::Draining);
    }
}
