//! In-memory stand-ins for the cluster and for backend replicas, used by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::core::client::deployments::{DeploymentListerWatcher, DeploymentListing};
use crate::core::client::kube_resources::{
    Deployment, DeploymentSpec, LabelSelector, ObjectMeta,
};
use crate::core::state::runtime::workload::workload_event::{CacheEvent, CacheEventType};

pub fn new_deployment(namespace: &str, name: &str, replicas: i32) -> Deployment {
    let labels = BTreeMap::from([("app".to_string(), name.to_string())]);
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A namespace of deployments whose watch streams can be fed, starved or cut by the test.
#[derive(Default)]
pub struct FakeDeploymentListerWatcher {
    deployments: Mutex<HashMap<String, Deployment>>,
    open_watches: Mutex<Vec<mpsc::UnboundedSender<CacheEvent>>>,
    sent_events: Mutex<Vec<CacheEvent>>,
    resource_version: AtomicUsize,
    lists: AtomicUsize,
    watches: AtomicUsize,
    fail_lists: AtomicBool,
}

impl FakeDeploymentListerWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployments(deployments: Vec<Deployment>) -> Self {
        let fake = Self::new();
        for d in deployments {
            fake.put(d, CacheEventType::Added, false);
        }
        fake
    }

    /// Adds or replaces a deployment; only open watch streams see it when `send_event` is set.
    pub fn add_deployment(&self, deployment: Deployment, send_event: bool) {
        self.put(deployment, CacheEventType::Added, send_event);
    }

    pub fn modify_deployment(&self, deployment: Deployment, send_event: bool) {
        self.put(deployment, CacheEventType::Modified, send_event);
    }

    pub fn delete_deployment(&self, name: &str, send_event: bool) {
        let removed = self.deployments.lock().unwrap().remove(name);
        self.resource_version.fetch_add(1, Ordering::SeqCst);
        if let (Some(d), true) = (removed, send_event) {
            self.send(CacheEvent::from_deployment(CacheEventType::Deleted, d).unwrap());
        }
    }

    /// Ends every open watch stream, as an API server does on timeout.
    pub fn close_open_watches(&self) {
        self.open_watches.lock().unwrap().clear();
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn sent_events(&self) -> Vec<CacheEvent> {
        self.sent_events.lock().unwrap().clone()
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }

    fn put(&self, deployment: Deployment, event_type: CacheEventType, send_event: bool) {
        let name = deployment.metadata.name.clone().unwrap();
        self.deployments.lock().unwrap().insert(name, deployment.clone());
        self.resource_version.fetch_add(1, Ordering::SeqCst);
        if send_event {
            self.send(CacheEvent::from_deployment(event_type, deployment).unwrap());
        }
    }

    fn send(&self, evt: CacheEvent) {
        let mut watches = self.open_watches.lock().unwrap();
        watches.retain(|tx| tx.send(evt.clone()).is_ok());
        self.sent_events.lock().unwrap().push(evt);
    }
}

#[async_trait]
impl DeploymentListerWatcher for FakeDeploymentListerWatcher {
    async fn list(&self) -> Result<DeploymentListing> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            bail!("simulated list failure");
        }
        Ok(DeploymentListing {
            items: self.deployments.lock().unwrap().values().cloned().collect(),
            resource_version: self.resource_version.load(Ordering::SeqCst).to_string(),
        })
    }

    async fn watch(&self, _resource_version: &str) -> Result<BoxStream<'static, CacheEvent>> {
        self.watches.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.open_watches.lock().unwrap().push(tx);
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|evt| (evt, rx)) }).boxed())
    }
}

/// What a fake backend answers on its count endpoint.
#[derive(Clone)]
pub enum BackendReply {
    Counts(HashMap<String, u64>),
    Status(StatusCode),
    Body(&'static str),
}

pub fn counts(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Serves `reply` on `GET /queue` from an ephemeral loopback port.
pub async fn spawn_count_backend(reply: BackendReply) -> SocketAddr {
    let app = Router::new().route(
        "/queue",
        get(move || {
            let reply = reply.clone();
            async move {
                match reply {
                    BackendReply::Counts(c) => axum::Json(c).into_response(),
                    BackendReply::Status(s) => s.into_response(),
                    BackendReply::Body(b) => ([("content-type", "application/json")], b).into_response(),
                }
            }
        }),
    );
    serve(app).await
}

pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
