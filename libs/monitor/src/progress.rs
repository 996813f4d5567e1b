//! Progress Builder (C4): turns a filter-stage `Candidate` into the
//! `ProgressUpdate` delivered to the MCP notifier (SPEC_FULL.md §4.4).

use chrono::Utc;

use crate::filter::Candidate;
use crate::model::{Phase, ProgressUpdate, RelatedObject, Severity, Source};

/// Build the wire-level update for an Event- or Condition-sourced candidate.
///
/// `fallback_message` is the condition's trimmed message when the candidate
/// came from a condition change and carries no template; `None` when the
/// candidate is Event-sourced (its own `template_message` always wins) or
/// when no message survives and `"Phase changed to {phase}"` is synthesized.
pub fn build(candidate: &Candidate, source: Source, fallback_message: Option<&str>) -> ProgressUpdate {
    let message = candidate
        .template_message
        .map(str::to_string)
        .or_else(|| fallback_message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()))
        .unwrap_or_else(|| format!("Phase changed to {}", candidate.phase));

    let related_object = match (&candidate.related_kind, &candidate.related_name, &candidate.related_namespace) {
        (Some(kind), Some(name), Some(namespace)) => Some(RelatedObject {
            kind: kind.clone(),
            name: name.clone(),
            namespace: namespace.clone(),
        }),
        _ => None,
    };

    ProgressUpdate {
        timestamp: Utc::now(),
        phase: candidate.phase,
        progress: candidate.percent,
        message,
        source,
        severity: candidate.severity,
        related_object,
        terminal: candidate.phase.is_terminal(),
    }
}

/// Build the synthetic "subscription terminated: {reason}" update used by
/// Draining when no other terminal update is already pending (timeout,
/// deletion, exhausted reconnect, explicit unsubscribe).
pub fn build_synthetic_termination(phase: Phase, severity: Severity, reason: &str) -> ProgressUpdate {
    ProgressUpdate {
        timestamp: Utc::now(),
        phase,
        progress: Some(phase.canonical_percent()),
        message: format!("subscription terminated: {reason}"),
        source: Source::Synthetic,
        severity,
        related_object: None,
        terminal: true,
    }
}

/// The initial snapshot emitted on entering `Running` (§4.5).
pub fn build_initial_snapshot(phase: Phase, percent: Option<u8>) -> ProgressUpdate {
    ProgressUpdate {
        timestamp: Utc::now(),
        phase,
        progress: percent,
        message: format!("Phase changed to {phase}"),
        source: Source::Synthetic,
        severity: Severity::Info,
        related_object: None,
        terminal: phase.is_terminal(),
    }
}
