//! Filter Pipeline (C3): decides whether an incoming `DecisionInput` produces
//! a `ProgressUpdate` (SPEC_FULL.md §4.3). Five stages, each able to reject;
//! a rejection at any stage discards the input.
//!
//! The pipeline itself is a pure function of `FilterState` plus the input;
//! all mutation happens through the returned updated state, per the
//! "DecisionInput" design note (§9) that keeps `(state, input) -> (state,
//! decision)` testable without a running subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;

use crate::metrics::MonitorMetrics;
use crate::model::{EventRecord, EventType, Phase, Severity};
use crate::significance::{dedup_window_for, find_include_match, is_suppressed};

const SEEN_EVENT_UIDS_CAPACITY: u64 = 1024;
const MAX_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// One candidate that survived scoping and significance, carrying everything
/// the progress builder (C4) needs.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub phase: Phase,
    pub percent: Option<u8>,
    pub severity: Severity,
    pub template_message: Option<&'static str>,
    pub related_kind: Option<String>,
    pub related_name: Option<String>,
    pub related_namespace: Option<String>,
}

/// Per-subscription mutable filter state: `dedupeCache` and `seenEventUIDs`
/// from §5 ("Bounded memory per subscription"), plus the rate-limit bucket.
pub struct FilterState {
    namespace: String,
    cluster_name: String,
    current_phase: Phase,
    dedupe_cache: HashMap<(String, String, String), Instant>,
    seen_event_uids: Cache<String, ()>,
    rate_limit_tokens: u32,
    rate_limit_burst: u32,
    rate_limit_interval: Duration,
    last_rate_limited_emit: Option<Instant>,
    metrics: Option<Arc<MonitorMetrics>>,
}

impl FilterState {
    pub fn new(
        namespace: impl Into<String>,
        cluster_name: impl Into<String>,
        rate_limit_burst: u32,
        rate_limit_interval: Duration,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            cluster_name: cluster_name.into(),
            current_phase: Phase::Initializing,
            dedupe_cache: HashMap::new(),
            seen_event_uids: Cache::new(SEEN_EVENT_UIDS_CAPACITY),
            rate_limit_tokens: rate_limit_burst,
            rate_limit_burst,
            rate_limit_interval,
            last_rate_limited_emit: None,
            metrics: None,
        }
    }

    /// Attach the subsystem's `MonitorMetrics` so each pipeline-stage
    /// rejection is counted (`events_filtered`, §"Metrics"). Optional: unit
    /// tests construct a `FilterState` without metrics and simply don't get
    /// counted, which is fine since they assert on the `Candidate`, not on
    /// the registry.
    pub fn with_metrics(mut self, metrics: Arc<MonitorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    /// Sync `current_phase` to the phase detected from the initial snapshot
    /// (§4.5 "Initial snapshot"). Without this, the first post-`start()`
    /// candidate reporting the same phase as the initial snapshot would be
    /// misjudged as a transition (still `Initializing` here) and bypass
    /// dedup/rate-limit, duplicating the already-emitted initial update.
    pub fn set_current_phase(&mut self, phase: Phase) {
        self.current_phase = phase;
    }

    fn record_filtered(&self, stage: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_filtered(stage);
        }
    }

    fn scope_allows(&self, involved_namespace: &str, involved_name: &str) -> bool {
        involved_namespace == self.namespace
            && (involved_name == self.cluster_name
                || involved_name
                    .strip_prefix(&format!("{}-", self.cluster_name))
                    .is_some())
    }

    fn prune_dedupe_cache(&mut self, now: Instant) {
        self.dedupe_cache
            .retain(|_, last| now.duration_since(*last) < MAX_DEDUP_WINDOW);
    }

    /// Stage 3 + Stage 5 bookkeeping shared by both event and condition
    /// candidates once they have survived scoping and significance.
    fn admit(
        &mut self,
        dedupe_key: Option<(String, String, String)>,
        event_uid: Option<&str>,
        resulting_phase: Phase,
        now: Instant,
    ) -> bool {
        if let Some(uid) = event_uid {
            if self.seen_event_uids.get(uid).is_some() {
                self.record_filtered("duplicate_uid");
                return false;
            }
        }

        let is_transition = resulting_phase != self.current_phase;

        if !is_transition {
            if let Some(key) = &dedupe_key {
                self.prune_dedupe_cache(now);
                if let Some(last) = self.dedupe_cache.get(key) {
                    let window = dedup_window_for(&key.0);
                    if now.duration_since(*last) < window {
                        self.record_filtered("dedup");
                        return false;
                    }
                }
            }

            // Stage 5: token bucket. Replenish one token per elapsed interval.
            if let Some(last) = self.last_rate_limited_emit {
                let elapsed = now.duration_since(last);
                let replenished = (elapsed.as_secs_f64() / self.rate_limit_interval.as_secs_f64())
                    as u32;
                self.rate_limit_tokens =
                    (self.rate_limit_tokens + replenished).min(self.rate_limit_burst);
            }
            if self.rate_limit_tokens == 0 {
                self.record_filtered("rate_limit");
                return false;
            }
            self.rate_limit_tokens -= 1;
            self.last_rate_limited_emit = Some(now);
        }

        if let Some(uid) = event_uid {
            self.seen_event_uids.insert(uid.to_string(), ());
        }
        if let Some(key) = dedupe_key {
            self.dedupe_cache.insert(key, now);
        }

        self.current_phase = resulting_phase;
        true
    }

    /// Evaluate an incoming Event against all five stages.
    pub fn evaluate_event(&mut self, event: &EventRecord, now: Instant) -> Option<Candidate> {
        if !self.scope_allows(&event.involved_namespace, &event.involved_name) {
            self.record_filtered("scope");
            return None;
        }

        if is_suppressed(&event.reason, &event.message) {
            self.record_filtered("suppress");
            return None;
        }

        let pattern = match find_include_match(&event.reason, &event.involved_kind, &event.message) {
            Some(p) => p,
            None => {
                self.record_filtered("significance");
                return None;
            }
        };

        let severity = if event.type_ == EventType::Warning {
            Severity::Warning
        } else {
            pattern.severity
        };

        let resulting_phase = if pattern.phase_hint.is_monotone_transition_from(self.current_phase)
        {
            pattern.phase_hint
        } else {
            self.current_phase
        };

        let dedupe_key = (
            event.reason.clone(),
            event.involved_kind.clone(),
            event.involved_name.clone(),
        );

        if !self.admit(Some(dedupe_key), Some(&event.uid), resulting_phase, now) {
            return None;
        }

        Some(Candidate {
            phase: resulting_phase,
            percent: Some(resulting_phase.canonical_percent()),
            severity,
            template_message: Some(pattern.template_message),
            related_kind: Some(event.involved_kind.clone()),
            related_name: Some(event.involved_name.clone()),
            related_namespace: Some(event.involved_namespace.clone()),
        })
    }

    /// Evaluate a condition-derived phase detection result. Condition changes
    /// bypass Stage 1 (they always belong to the watched object) and are
    /// always a candidate when the phase changes; unchanged phase still
    /// passes through dedup/rate-limit like an Event would, keyed on the
    /// `Ready` condition's reason so repeated identical reasons collapse.
    pub fn evaluate_condition(
        &mut self,
        detected_phase: Phase,
        percent: Option<u8>,
        reason: &str,
        message: Option<String>,
        is_terminal_failure: bool,
        now: Instant,
    ) -> Option<Candidate> {
        let resulting_phase = if detected_phase.is_monotone_transition_from(self.current_phase) {
            detected_phase
        } else {
            // Ready regressed from True back to False without a terminal
            // reason: clamp to Scaling per §4.2's tie-break rule and mark
            // the emitted severity as a regression (warning, not error).
            Phase::Scaling
        };

        let severity = if is_terminal_failure {
            Severity::Error
        } else if resulting_phase == Phase::Scaling && detected_phase != Phase::Scaling {
            Severity::Warning
        } else {
            Severity::Info
        };

        let dedupe_key = ("Condition:Ready".to_string(), "ClusterDeployment".to_string(), reason.to_string());

        if !self.admit(Some(dedupe_key), None, resulting_phase, now) {
            return None;
        }

        Some(Candidate {
            phase: resulting_phase,
            percent,
            severity,
            template_message: None,
            related_kind: None,
            related_name: None,
            related_namespace: None,
        })
    }
}
