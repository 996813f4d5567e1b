//! Phase Detector (C2): maps a `ClusterDeploymentSnapshot` to a `Phase` and an
//! estimated percent (SPEC_FULL.md §4.2).
//!
//! The substring table is plain data (`MESSAGE_PATTERNS`) rather than a chain
//! of `if`s, so the set of recognized Cluster API phrasings can grow without
//! touching `detect_phase` itself.

use crate::model::{ClusterDeploymentSnapshot, ConditionStatus, Phase};

/// Reasons on a `Ready=False` condition that are terminal (no retry expected).
const TERMINAL_FAILURE_REASONS: &[&str] = &[
    "Failed",
    "InvalidCredential",
    "QuotaExceeded",
    "ProvisioningTimeout",
    "ValidationFailed",
];

/// One entry of the `Ready` condition message substring table. Entries are
/// tried in array order; the first whose `all_of` substrings are all present
/// wins. `min_percent`/`max_percent` bound the percent the caller may refine
/// within this phase when several sub-resource substrings are present
/// (sub-resource ordering breaks ties toward the higher percent).
struct MessagePattern {
    all_of: &'static [&'static str],
    phase: Phase,
    percent: u8,
}

const MESSAGE_PATTERNS: &[MessagePattern] = &[
    MessagePattern {
        all_of: &["Object is ready"],
        phase: Phase::Ready,
        percent: 100,
    },
    MessagePattern {
        all_of: &["WorkersAvailable", "1+ available replicas"],
        phase: Phase::Ready,
        percent: 100,
    },
    MessagePattern {
        all_of: &["WorkersAvailable", "0 available replicas"],
        phase: Phase::Scaling,
        percent: 75,
    },
    MessagePattern {
        all_of: &["ControlPlaneReady is now True"],
        phase: Phase::Scaling,
        percent: 70,
    },
    MessagePattern {
        all_of: &["ControlPlaneInitialized"],
        phase: Phase::Bootstrapping,
        percent: 50,
    },
    MessagePattern {
        all_of: &["not yet initialized"],
        phase: Phase::Bootstrapping,
        percent: 50,
    },
    MessagePattern {
        all_of: &["InfrastructureReady is now True"],
        phase: Phase::Bootstrapping,
        percent: 60,
    },
    // Sub-resource ordering for the generic "creating or updating" bucket:
    // resource-group < network < subnets < machines (lowest to highest percent).
    MessagePattern {
        all_of: &["creating or updating", "machine"],
        phase: Phase::Provisioning,
        percent: 45,
    },
    MessagePattern {
        all_of: &["creating or updating", "subnet"],
        phase: Phase::Provisioning,
        percent: 38,
    },
    MessagePattern {
        all_of: &["creating or updating", "network"],
        phase: Phase::Provisioning,
        percent: 30,
    },
    MessagePattern {
        all_of: &["creating or updating"],
        phase: Phase::Provisioning,
        percent: 25,
    },
];

fn message_matches(message: &str, pattern: &MessagePattern) -> bool {
    let lower = message.to_lowercase();
    pattern
        .all_of
        .iter()
        .all(|needle| lower.contains(&needle.to_lowercase()))
}

/// Detect the phase and estimated percent from the current snapshot, per the
/// five-step priority order in §4.2 (first match wins).
pub fn detect_phase(snapshot: &ClusterDeploymentSnapshot) -> (Phase, Option<u8>) {
    let Some(ready) = snapshot.ready_condition() else {
        return (Phase::Initializing, Some(5));
    };

    // Open question resolved per SPEC_FULL.md/DESIGN.md: any Ready=True is
    // treated as terminal regardless of reason, not only the observed
    // "Succeeded"/"Provisioned" reasons.
    if ready.status == ConditionStatus::True {
        return (Phase::Ready, Some(100));
    }

    if ready.status == ConditionStatus::False
        && TERMINAL_FAILURE_REASONS.iter().any(|r| *r == ready.reason)
    {
        return (Phase::Failed, Some(0));
    }

    if snapshot.condition("ControlPlaneReady").map(|c| c.status) == Some(ConditionStatus::True)
        || snapshot.condition("InfrastructureReady").map(|c| c.status)
            == Some(ConditionStatus::True)
    {
        // Fold the presence of a boolean sub-condition into the substring
        // search space so either phrasing style reaches the same entries.
        let synthetic_hint = if snapshot.condition("ControlPlaneReady").map(|c| c.status)
            == Some(ConditionStatus::True)
        {
            "ControlPlaneReady is now True"
        } else if snapshot.condition("InfrastructureReady").map(|c| c.status)
            == Some(ConditionStatus::True)
        {
            "InfrastructureReady is now True"
        } else {
            ""
        };
        let combined = format!("{} {}", ready.message, synthetic_hint);
        if let Some(hit) = MESSAGE_PATTERNS.iter().find(|p| message_matches(&combined, p)) {
            return (hit.phase, Some(hit.percent));
        }
    }

    if let Some(hit) = MESSAGE_PATTERNS.iter().find(|p| message_matches(&ready.message, p)) {
        return (hit.phase, Some(hit.percent));
    }

    // No pattern matched a `False`/`Unknown` Ready condition with no
    // recognizable breakdown yet: treat as still initializing.
    (Phase::Initializing, Some(5))
}
