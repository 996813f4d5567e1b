//! Data model shared by the watch sources, phase detector, filter pipeline and
//! progress builder (C1-C4, see SPEC_FULL.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The subscription key: one `ClusterDeployment` identified by namespace and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClusterDeploymentRef {
    pub namespace: String,
    pub name: String,
}

impl ClusterDeploymentRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ClusterDeploymentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Status of a single condition on the watched object, mirroring
/// `k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition.status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<&str> for ConditionStatus {
    fn from(s: &str) -> Self {
        match s {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }
}

/// A single structured condition entry. The core treats all but the `Ready`
/// condition's message as opaque (SPEC_FULL.md GLOSSARY, "Condition").
#[derive(Clone, Debug)]
pub struct Condition {
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// The observed state of the watched `ClusterDeployment`, refreshed on every
/// watch event and never persisted (SPEC_FULL.md §3).
#[derive(Clone, Debug)]
pub struct ClusterDeploymentSnapshot {
    pub resource_version: String,
    pub conditions: Vec<Condition>,
}

impl ClusterDeploymentSnapshot {
    /// The condition whose type is `Ready`, if the object has reported one yet.
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == "Ready")
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// The `Ready` condition's message, the authoritative structured progress
    /// breakdown that the phase detector parses by substring.
    pub fn phase_message(&self) -> Option<&str> {
        self.ready_condition().map(|c| c.message.as_str())
    }
}

/// `Normal` or `Warning`, as reported on a Kubernetes Event object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "Warning" => EventType::Warning,
            _ => EventType::Normal,
        }
    }
}

/// A Kubernetes Event observed in the subscription's namespace. Consulted by
/// the filter pipeline then discarded; only a dedup key survives it
/// (SPEC_FULL.md §3, "EventRecord").
#[derive(Clone, Debug)]
pub struct EventRecord {
    pub uid: String,
    pub reason: String,
    pub message: String,
    pub type_: EventType,
    pub involved_kind: String,
    pub involved_name: String,
    pub involved_namespace: String,
    pub count: i32,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// The seven-value provisioning-lifecycle enumeration, with a total order used
/// for percent estimation and monotonicity checks (SPEC_FULL.md §3, "Phase").
/// `Failed` sits off the ladder: it is reachable from any non-terminal phase
/// and is never itself superseded except by a fresh `Subscribe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    Initializing,
    Provisioning,
    Bootstrapping,
    Scaling,
    Installing,
    Ready,
    Failed,
}

impl Phase {
    /// Position on the ladder; `Failed` has no rank (it is off-ladder).
    fn ladder_rank(self) -> Option<u8> {
        match self {
            Phase::Initializing => Some(0),
            Phase::Provisioning => Some(1),
            Phase::Bootstrapping => Some(2),
            Phase::Scaling => Some(3),
            Phase::Installing => Some(4),
            Phase::Ready => Some(5),
            Phase::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ready | Phase::Failed)
    }

    /// `true` iff `self` is a permitted successor of `current` under I4:
    /// non-decreasing on the ladder, or a transition into `Failed` from any
    /// non-terminal phase.
    pub fn is_monotone_transition_from(self, current: Phase) -> bool {
        if self == Phase::Failed {
            return !current.is_terminal() || current == Phase::Failed;
        }
        match (current.ladder_rank(), self.ladder_rank()) {
            (Some(cur), Some(next)) => next >= cur,
            // `current == Failed`: no further transitions are permitted.
            _ => false,
        }
    }

    /// Canonical percent for the phase itself, before §4.2's condition-level
    /// refinement.
    pub fn canonical_percent(self) -> u8 {
        match self {
            Phase::Initializing => 5,
            Phase::Provisioning => 35,
            Phase::Bootstrapping => 55,
            Phase::Scaling => 70,
            Phase::Installing => 85,
            Phase::Ready => 100,
            Phase::Failed => 0,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Initializing => "Initializing",
            Phase::Provisioning => "Provisioning",
            Phase::Bootstrapping => "Bootstrapping",
            Phase::Scaling => "Scaling",
            Phase::Installing => "Installing",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Where a `ProgressUpdate` originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Condition,
    Event,
    Synthetic,
}

/// Severity classification of a `ProgressUpdate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The resource a `ProgressUpdate` is about, when it is not the
/// `ClusterDeployment` itself (e.g. a child `MachineDeployment`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedObject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// The delta pushed to MCP subscribers (SPEC_FULL.md §3, "ProgressUpdate").
/// Produced by the progress builder (C4), consumed by the MCP notifier
/// (external), never stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub message: String,
    pub source: Source,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_object: Option<RelatedObject>,
    pub terminal: bool,
}

impl ProgressUpdate {
    /// Equality used by P9 (round-trip GetState), ignoring the timestamp.
    pub fn eq_ignoring_timestamp(&self, other: &Self) -> bool {
        self.phase == other.phase
            && self.progress == other.progress
            && self.message == other.message
            && self.source == other.source
            && self.severity == other.severity
            && self.related_object == other.related_object
            && self.terminal == other.terminal
    }
}

/// Total order comparison helper used by tests asserting I4/P3 directly on a
/// sequence of phases.
pub fn phase_rank_for_assertions(p: Phase) -> i8 {
    match p {
        Phase::Initializing => 0,
        Phase::Provisioning => 1,
        Phase::Bootstrapping => 2,
        Phase::Scaling => 3,
        Phase::Installing => 4,
        Phase::Ready => 5,
        Phase::Failed => -1,
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.ladder_rank(), other.ladder_rank()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotone_transitions_allow_forward_ladder_moves() {
        assert!(Phase::Provisioning.is_monotone_transition_from(Phase::Initializing));
        assert!(!Phase::Initializing.is_monotone_transition_from(Phase::Provisioning));
        assert!(Phase::Scaling.is_monotone_transition_from(Phase::Scaling));
    }

    #[test]
    fn failed_is_reachable_from_any_non_terminal_phase() {
        for p in [
            Phase::Initializing,
            Phase::Provisioning,
            Phase::Bootstrapping,
            Phase::Scaling,
            Phase::Installing,
        ] {
            assert!(Phase::Failed.is_monotone_transition_from(p));
        }
        assert!(!Phase::Ready.is_monotone_transition_from(Phase::Failed));
    }

    #[test]
    fn ready_is_terminal_and_has_no_successor() {
        assert!(Phase::Ready.is_terminal());
        assert!(!Phase::Provisioning.is_monotone_transition_from(Phase::Ready));
    }
}
