//! Production `ClientFactory` (SPEC_FULL.md §6) backed by a real `kube::Client`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event as K8sEvent;
use kube::api::{Api, ObjectMeta};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;

use k0rdent_mcp_monitor::crd::ClusterDeployment;
use k0rdent_mcp_monitor::error::{Error, Result};
use k0rdent_mcp_monitor::k8s::{CdWatchEvent, ClientFactory, EventWatchEvent};
use k0rdent_mcp_monitor::model::EventRecord;

pub struct KubeClientFactory {
    client: Client,
}

impl KubeClientFactory {
    pub fn new(client: Client) -> Arc<dyn ClientFactory> {
        Arc::new(Self { client })
    }
}

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn get_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDeployment>> {
        let api: Api<ClusterDeployment> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await {
            Ok(cd) => Ok(cd),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    fn watch_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> BoxStream<'static, Result<CdWatchEvent>> {
        let api: Api<ClusterDeployment> = Api::namespaced(self.client.clone(), namespace);
        let cfg = watcher::Config::default().fields(&format!("metadata.name={name}"));

        let stream = watcher(api, cfg).filter_map(|item| async move {
            match item {
                Ok(watcher::Event::Apply(cd)) | Ok(watcher::Event::InitApply(cd)) => {
                    Some(Ok(CdWatchEvent::Applied(cd)))
                }
                Ok(watcher::Event::Delete(_)) => Some(Ok(CdWatchEvent::Deleted)),
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                Err(e) => Some(Err(Error::Internal(format!(
                    "cluster deployment watch error: {e}"
                )))),
            }
        });
        Box::pin(stream)
    }

    fn watch_events(&self, namespace: &str) -> BoxStream<'static, Result<EventWatchEvent>> {
        let api: Api<K8sEvent> = Api::namespaced(self.client.clone(), namespace);
        let cfg = watcher::Config::default();

        let stream = watcher(api, cfg)
            .applied_objects()
            .map(|item| match item {
                Ok(ev) => Ok(EventWatchEvent::Applied(to_event_record(&ev))),
                Err(e) => Err(Error::Internal(format!("event watch error: {e}"))),
            });
        Box::pin(stream)
    }
}

fn to_event_record(ev: &K8sEvent) -> EventRecord {
    let meta: &ObjectMeta = &ev.metadata;
    let involved = &ev.involved_object;
    EventRecord {
        uid: meta.uid.clone().unwrap_or_default(),
        reason: ev.reason.clone().unwrap_or_default(),
        message: ev.message.clone().unwrap_or_default(),
        type_: ev.type_.as_deref().unwrap_or("Normal").into(),
        involved_kind: involved.kind.clone().unwrap_or_default(),
        involved_name: involved.name.clone().unwrap_or_default(),
        involved_namespace: involved.namespace.clone().unwrap_or_default(),
        count: ev.count.unwrap_or(1),
        first_timestamp: ev.first_timestamp.as_ref().map(|t| t.0),
        last_timestamp: ev.last_timestamp.as_ref().map(|t| t.0),
    }
}
