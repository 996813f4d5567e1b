//! Data-driven significance tables for the filter pipeline's Stage 2
//! (SPEC_FULL.md §4.3, §6 "Seed significance patterns").
//!
//! Kept as plain data, not code, per §4.2's design note so the table can
//! evolve without touching the pipeline logic.

use crate::model::{Phase, Severity};
use std::time::Duration;

/// One entry of the include table: an Event matching `reason` (and, if
/// present, `involved_kind`/`message_contains`) is a significance candidate
/// carrying `phase_hint`, `severity` and an optional canned `template_message`.
#[derive(Clone, Copy, Debug)]
pub struct IncludePattern {
    pub reason: &'static str,
    pub involved_kind: Option<&'static str>,
    pub message_contains: Option<&'static str>,
    pub phase_hint: Phase,
    pub severity: Severity,
    pub template_message: &'static str,
}

/// The seed include table (§6, twelve entries minimum).
pub const INCLUDE_TABLE: &[IncludePattern] = &[
    IncludePattern {
        reason: "HelmReleaseCreated",
        involved_kind: Some("ClusterDeployment"),
        message_contains: None,
        phase_hint: Phase::Initializing,
        severity: Severity::Info,
        template_message: "Helm release created for cluster deployment",
    },
    IncludePattern {
        reason: "InstallSucceeded",
        involved_kind: Some("HelmRelease"),
        message_contains: None,
        phase_hint: Phase::Initializing,
        severity: Severity::Info,
        template_message: "Helm chart installation succeeded",
    },
    IncludePattern {
        reason: "Provisioning",
        involved_kind: Some("Cluster"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Cluster infrastructure provisioning started",
    },
    IncludePattern {
        reason: "CAPIClusterIsProvisioning",
        involved_kind: Some("Cluster"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Cluster infrastructure provisioning in progress",
    },
    IncludePattern {
        reason: "BeginCreateOrUpdate",
        involved_kind: Some("ResourceGroup"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Creating resource group",
    },
    IncludePattern {
        reason: "BeginCreateOrUpdate",
        involved_kind: Some("VirtualNetwork"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Creating virtual network",
    },
    IncludePattern {
        reason: "BeginCreateOrUpdate",
        involved_kind: Some("Subnet"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Creating subnet",
    },
    IncludePattern {
        reason: "BeginCreateOrUpdate",
        involved_kind: Some("NATGateway"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Creating NAT gateway",
    },
    IncludePattern {
        reason: "BeginCreateOrUpdate",
        involved_kind: Some("VPC"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Creating VPC",
    },
    IncludePattern {
        reason: "BeginCreateOrUpdate",
        involved_kind: Some("Network"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Creating network",
    },
    IncludePattern {
        reason: "SuccessfulCreate",
        involved_kind: Some("MachineDeployment"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Machine deployment created",
    },
    IncludePattern {
        reason: "SuccessfulCreate",
        involved_kind: Some("MachineSet"),
        message_contains: None,
        phase_hint: Phase::Provisioning,
        severity: Severity::Info,
        template_message: "Machine set created",
    },
    IncludePattern {
        reason: "InfrastructureReady",
        involved_kind: None,
        message_contains: None,
        phase_hint: Phase::Bootstrapping,
        severity: Severity::Info,
        template_message: "Cluster infrastructure is ready",
    },
    IncludePattern {
        reason: "ControlPlaneReady",
        involved_kind: Some("K0sControlPlane"),
        message_contains: None,
        phase_hint: Phase::Bootstrapping,
        severity: Severity::Info,
        template_message: "Control plane is ready",
    },
    IncludePattern {
        reason: "ControlPlaneReady",
        involved_kind: Some("KubeadmControlPlane"),
        message_contains: None,
        phase_hint: Phase::Bootstrapping,
        severity: Severity::Info,
        template_message: "Control plane is ready",
    },
    IncludePattern {
        reason: "MachineReady",
        involved_kind: Some("Machine"),
        message_contains: Some("control-plane"),
        phase_hint: Phase::Bootstrapping,
        severity: Severity::Info,
        template_message: "Control plane machine is ready",
    },
    IncludePattern {
        reason: "MachineReady",
        involved_kind: Some("Machine"),
        message_contains: Some("worker"),
        phase_hint: Phase::Scaling,
        severity: Severity::Info,
        template_message: "Worker machine is ready",
    },
    IncludePattern {
        reason: "NodeJoined",
        involved_kind: Some("Machine"),
        message_contains: None,
        phase_hint: Phase::Scaling,
        severity: Severity::Info,
        template_message: "Machine joined the cluster",
    },
    IncludePattern {
        reason: "ServiceInstalling",
        involved_kind: Some("ServiceSet"),
        message_contains: None,
        phase_hint: Phase::Installing,
        severity: Severity::Info,
        template_message: "Installing cluster service",
    },
    IncludePattern {
        reason: "ServiceReady",
        involved_kind: Some("ServiceSet"),
        message_contains: None,
        phase_hint: Phase::Installing,
        severity: Severity::Info,
        template_message: "Cluster service is ready",
    },
    IncludePattern {
        reason: "CAPIClusterIsReady",
        involved_kind: Some("ClusterDeployment"),
        message_contains: None,
        phase_hint: Phase::Ready,
        severity: Severity::Info,
        template_message: "Cluster has been provisioned",
    },
];

/// The seed suppress table (§6). Matched on the reason alone, or on a message
/// substring when the reason itself is not distinguishing enough.
#[derive(Clone, Copy, Debug)]
pub struct SuppressPattern {
    pub reason: Option<&'static str>,
    pub message_contains: Option<&'static str>,
}

pub const SUPPRESS_TABLE: &[SuppressPattern] = &[
    SuppressPattern {
        reason: Some("OwnerRefNotSet"),
        message_contains: None,
    },
    SuppressPattern {
        reason: Some("ArtifactUpToDate"),
        message_contains: None,
    },
    SuppressPattern {
        reason: Some("VMIdentityNone"),
        message_contains: None,
    },
    SuppressPattern {
        reason: Some("ServiceSetEnsureProfileFailed"),
        message_contains: None,
    },
    SuppressPattern {
        reason: Some("ServiceSetCollectServiceStatusesFailed"),
        message_contains: None,
    },
    SuppressPattern {
        reason: Some("ClusterReconcilerNormalFailed"),
        message_contains: None,
    },
    SuppressPattern {
        reason: None,
        message_contains: Some("WaitingForControlPlaneInitialization"),
    },
    SuppressPattern {
        reason: None,
        message_contains: Some("WaitingForClusterInfrastructure"),
    },
];

/// Per-reason deduplication window (Stage 3). Reasons not listed fall back to
/// `DEFAULT_DEDUP_WINDOW`.
pub fn dedup_window_for(reason: &str) -> Duration {
    match reason {
        "CAPIClusterIsProvisioning" => Duration::from_secs(60),
        "ClusterReconcilerNormalFailed" => Duration::from_secs(120),
        "ServiceSetCollectServiceStatusesFailed" => Duration::from_secs(300),
        _ => DEFAULT_DEDUP_WINDOW,
    }
}

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

pub fn find_include_match(
    reason: &str,
    involved_kind: &str,
    message: &str,
) -> Option<&'static IncludePattern> {
    INCLUDE_TABLE.iter().find(|p| {
        p.reason == reason
            && p.involved_kind.map(|k| k == involved_kind).unwrap_or(true)
            && p.message_contains
                .map(|m| message.contains(m))
                .unwrap_or(true)
    })
}

pub fn is_suppressed(reason: &str, message: &str) -> bool {
    SUPPRESS_TABLE.iter().any(|p| {
        p.reason.map(|r| r == reason).unwrap_or(false)
            || p.message_contains.map(|m| message.contains(m)).unwrap_or(false)
    })
}
