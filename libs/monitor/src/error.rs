//! Error taxonomy for the monitoring core (SPEC_FULL.md §7).
//!
//! Variants map one-to-one onto the kinds named in the specification rather
//! than onto implementation accidents, so that `Subscribe`/`GetState` callers
//! can match on them directly.

use crate::model::ClusterDeploymentRef;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed subscribe URI, empty namespace/name, or invalid timeout.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session's namespace allow-list rejected the request.
    #[error("namespace {namespace} is not permitted for this session")]
    PermissionDenied { namespace: String },

    /// The `ClusterDeployment` does not exist at Subscribe/GetState time.
    #[error("cluster deployment {0} not found")]
    NotFound(ClusterDeploymentRef),

    /// Per-client or global subscription cap reached.
    #[error("subscription cap exceeded: {0}")]
    ResourceExhausted(String),

    /// Watch streams could not be established after exhausted reconnection.
    #[error("watch unavailable for {ref_}: {reason}")]
    Unavailable {
        ref_: ClusterDeploymentRef,
        reason: String,
    },

    /// Should be impossible; logged at error level and the subscription closed.
    #[error("internal error: {0}")]
    Internal(String),

    /// Transport failure surfaced synchronously from the Kubernetes client.
    #[error("kubernetes client error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Low-cardinality label for Prometheus error counters, mirroring the
    /// teacher's `Error::metric_label` used by `ReconcileMetrics::set_failure`.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::PermissionDenied { .. } => "permission_denied",
            Error::NotFound(_) => "not_found",
            Error::ResourceExhausted(_) => "resource_exhausted",
            Error::Unavailable { .. } => "unavailable",
            Error::Internal(_) => "internal",
            Error::Kube(_) => "kube",
        }
    }
}
