//! Kubernetes `ClusterDeployment` monitoring core: watches a cluster's
//! provisioning lifecycle and turns it into a stream of `ProgressUpdate`s for
//! MCP subscribers.
//!
//! The public surface an embedding MCP server needs is `manager::MonitorManager`
//! plus the `k8s::ClientFactory` and `mcp::{Session, Notifier}` traits it must
//! implement; everything else is internal machinery (C1-C5) reachable through it.

pub mod config;
pub mod crd;
pub mod error;
pub mod filter;
pub mod k8s;
pub mod manager;
pub mod mcp;
pub mod metrics;
pub mod model;
pub mod phase;
pub mod progress;
pub mod significance;
pub mod subscription;
pub mod telemetry;
pub mod uri;
pub mod watch;

pub use config::MonitorConfig;
pub use error::{Error, Result};
pub use manager::{MonitorManager, SubscribeResult};
pub use model::{ClusterDeploymentRef, Phase, ProgressUpdate, Severity, Source};
