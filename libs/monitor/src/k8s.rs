//! The Kubernetes client factory boundary (SPEC_FULL.md §6, "External
//! collaborator contracts"). The monitor core depends only on this trait;
//! production wiring is in `cmd/server`, backed by `k0rdent-mcp-k8s-util`.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::crd::ClusterDeployment;
use crate::error::Result;
use crate::model::EventRecord;

/// One watch event, tagged so C1 can distinguish an update from the initial
/// list-time absence of the object.
#[derive(Clone, Debug)]
pub enum CdWatchEvent {
    Applied(ClusterDeployment),
    Deleted,
}

#[derive(Clone, Debug)]
pub enum EventWatchEvent {
    Applied(EventRecord),
}

/// Typed `Get`/`Watch` access to `ClusterDeployment`s and their namespace
/// Events, reconnecting internally using an opaque `resourceVersion` and
/// exposing only what C1 needs.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    async fn get_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDeployment>>;

    fn watch_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> BoxStream<'static, Result<CdWatchEvent>>;

    fn watch_events(&self, namespace: &str) -> BoxStream<'static, Result<EventWatchEvent>>;
}
