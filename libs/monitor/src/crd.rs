//! The `ClusterDeployment` custom resource type.
//!
//! This core treats `.spec` as opaque (it neither reads nor mutates
//! provider-specific deploy configuration, SPEC_FULL.md "Non-goals") and only
//! interprets `.status.conditions`. Modeled after the teacher's `Echo`/
//! `EchoStatus` CRD derive shape.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::{self, Condition as ModelCondition, ConditionStatus};

/// Opaque spec: this core does not interpret any field of it. A real
/// deployment carries the provider template, credentials reference, and
/// cluster topology here; none of that participates in monitoring.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "k0rdent.mirantis.com",
    version = "v1beta1",
    kind = "ClusterDeployment",
    plural = "clusterdeployments",
    namespaced,
    status = "ClusterDeploymentStatus"
)]
pub struct ClusterDeploymentSpec {
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ClusterDeploymentStatus {
    #[serde(default)]
    pub conditions: Vec<RawCondition>,
}

/// Mirrors `k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition`'s wire
/// shape. Defined locally (rather than reused from `k8s-openapi`) so the CRD
/// spec can derive `JsonSchema` without enabling k8s-openapi's `schemars`
/// feature, which the rest of the workspace does not need.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct RawCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: Option<String>,
}

impl From<&RawCondition> for ModelCondition {
    fn from(raw: &RawCondition) -> Self {
        let last_transition_time = raw
            .last_transition_time
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(chrono::Utc::now);
        ModelCondition {
            type_: raw.type_.clone(),
            status: ConditionStatus::from(raw.status.as_str()),
            reason: raw.reason.clone(),
            message: raw.message.clone(),
            last_transition_time,
        }
    }
}

impl ClusterDeployment {
    /// Build the watch-source-facing snapshot from the live object.
    pub fn to_snapshot(&self, resource_version: String) -> model::ClusterDeploymentSnapshot {
        let conditions = self
            .status
            .as_ref()
            .map(|s| s.conditions.iter().map(ModelCondition::from).collect())
            .unwrap_or_default();
        model::ClusterDeploymentSnapshot {
            resource_version,
            conditions,
        }
    }
}
