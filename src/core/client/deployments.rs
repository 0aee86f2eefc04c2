use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::ready;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::{Api, Client};
use tracing::{debug, warn};

use crate::core::client::kube_resources::Deployment;
use crate::core::state::runtime::workload::workload_event::{CacheEvent, CacheEventType};

/// Server-side timeout for one watch request; the API server closes the stream
/// afterwards and the cache re-lists.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Result of one full list: the objects plus the cursor to resume watching from.
#[derive(Debug, Clone, Default)]
pub struct DeploymentListing {
    pub items: Vec<Deployment>,
    pub resource_version: String,
}

/// List/watch access to the deployments of one namespace.
///
/// The stream returned by `watch` may end at any time (server timeout,
/// connection reset, expired resource version); callers treat that as transient.
#[async_trait]
pub trait DeploymentListerWatcher: Send + Sync {
    async fn list(&self) -> Result<DeploymentListing>;

    async fn watch(&self, resource_version: &str) -> Result<BoxStream<'static, CacheEvent>>;
}

/// `DeploymentListerWatcher` backed by the Kubernetes API.
pub struct KubeDeploymentListerWatcher {
    api: Api<Deployment>,
    namespace: String,
}

impl KubeDeploymentListerWatcher {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl DeploymentListerWatcher for KubeDeploymentListerWatcher {
    async fn list(&self) -> Result<DeploymentListing> {
        let deployment_list = self
            .api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("failed to list deployments in '{}'", self.namespace))?;

        debug!(
            "Discovered {} deployment(s) in namespace '{}'",
            deployment_list.items.len(),
            self.namespace
        );

        Ok(DeploymentListing {
            resource_version: deployment_list.metadata.resource_version.unwrap_or_default(),
            items: deployment_list.items,
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<BoxStream<'static, CacheEvent>> {
        let wp = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        let stream = self
            .api
            .watch(&wp, resource_version)
            .await
            .with_context(|| format!("failed to watch deployments in '{}'", self.namespace))?;

        debug!(
            namespace = %self.namespace,
            %resource_version,
            "Opened deployment watch stream"
        );

        let namespace = self.namespace.clone();
        let events = stream
            .map(move |item| match item {
                Ok(WatchEvent::Added(d)) => WatchStep::Event(CacheEventType::Added, d),
                Ok(WatchEvent::Modified(d)) => WatchStep::Event(CacheEventType::Modified, d),
                Ok(WatchEvent::Deleted(d)) => WatchStep::Event(CacheEventType::Deleted, d),
                Ok(WatchEvent::Bookmark(_)) => WatchStep::Skip,
                Ok(WatchEvent::Error(e)) => {
                    // Usually 410 Gone: the resource version expired
                    warn!(%namespace, error = ?e, "Deployment watch returned an error event");
                    WatchStep::End
                }
                Err(e) => {
                    warn!(%namespace, error = %e, "Deployment watch stream failed");
                    WatchStep::End
                }
            })
            .take_while(|step| ready(!matches!(step, WatchStep::End)))
            .filter_map(|step| {
                ready(match step {
                    WatchStep::Event(event_type, d) => CacheEvent::from_deployment(event_type, d),
                    WatchStep::Skip | WatchStep::End => None,
                })
            })
            .boxed();

        Ok(events)
    }
}

enum WatchStep {
    Event(CacheEventType, Deployment),
    Skip,
    End,
}
