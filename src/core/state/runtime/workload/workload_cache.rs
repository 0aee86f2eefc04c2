use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::client::deployments::{DeploymentListerWatcher, DeploymentListing};
use crate::core::client::kube_resources::Deployment;
use crate::core::state::runtime::workload::workload_event::CacheEvent;
use crate::core::state::runtime::workload::workload_state::WorkloadState;
use crate::core::state::runtime::workload::workload_subscription::Subscription;
use crate::errors::CacheError;

/// Queue length of each subscription before the oldest events are overwritten.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 128;

/// Pause before retrying after a failed list or watch.
const RELIST_BACKOFF: Duration = Duration::from_secs(1);

/// In-memory cache of the deployments of one namespace.
///
/// Kept fresh by `start_watcher`: a list establishes the state, a watch from the
/// list's resource version streams changes, a closed stream triggers a re-list,
/// and a reconcile ticker re-lists periodically no matter what the watch does.
/// Every change goes through one exclusive critical section that updates the map
/// and broadcasts to the name's subscribers.
pub struct WorkloadCache {
    lister: Arc<dyn DeploymentListerWatcher>,
    state: Arc<RwLock<WorkloadState>>,
    next_subscription_id: AtomicU64,
    subscription_capacity: usize,
}

impl WorkloadCache {
    /// Lists the namespace once and returns the populated cache.
    ///
    /// Fails when that first list fails; the scaler cannot start without it.
    pub async fn new(lister: Arc<dyn DeploymentListerWatcher>) -> Result<Self> {
        let listing = lister
            .list()
            .await
            .context("initial deployment list failed")?;

        let mut state = WorkloadState::default();
        state.apply_list(listing.items, listing.resource_version);
        info!("Deployment cache initialized with {} deployment(s)", state.len());

        Ok(Self {
            lister,
            state: Arc::new(RwLock::new(state)),
            next_subscription_id: AtomicU64::new(0),
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
        })
    }

    pub fn with_subscription_capacity(mut self, capacity: usize) -> Self {
        self.subscription_capacity = capacity.max(1);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, WorkloadState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorkloadState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached deployment named `name`.
    pub fn get(&self, name: &str) -> Result<Deployment, CacheError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(name.to_string()))
    }

    /// Like `get`, but always hands back a deployment: the zero value when the
    /// name is unknown, together with the not-found error.
    pub fn get_or_default(&self, name: &str) -> (Deployment, Option<CacheError>) {
        match self.get(name) {
            Ok(d) => (d, None),
            Err(e) => (Deployment::default(), Some(e)),
        }
    }

    /// Names of all cached deployments, sorted.
    pub fn names(&self) -> Vec<String> {
        self.read().names()
    }

    pub fn list(&self) -> Vec<Deployment> {
        self.read().deployments().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Time of the last successful full list.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.read().last_synced_at
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.read().subscriber_count(name)
    }

    /// Subscribes to every future change of the deployment named `name`.
    pub fn watch(&self, name: &str) -> Subscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.write().subscribe(name, id, self.subscription_capacity);
        debug!(%name, id, "Subscription registered");
        Subscription::new(id, name.to_string(), rx, Arc::downgrade(&self.state))
    }

    /// Applies a full listing and broadcasts the resulting diff.
    ///
    /// Returns the number of names that changed.
    pub(crate) fn merge_and_broadcast_list(&self, listing: DeploymentListing) -> usize {
        let mut state = self.write();
        let events = state.apply_list(listing.items, listing.resource_version);
        for evt in &events {
            state.broadcast(evt);
        }
        events.len()
    }

    /// Applies one watch event and broadcasts it if it changed the map.
    pub(crate) fn merge_and_broadcast_event(&self, evt: CacheEvent) -> bool {
        let mut state = self.write();
        match state.apply_event(evt) {
            Some(applied) => {
                debug!(name = %applied.name, event = %applied.event_type, "Deployment cache updated");
                state.broadcast(&applied);
                true
            }
            None => false,
        }
    }

    async fn list_and_merge(&self) -> Result<String> {
        let listing = self.lister.list().await?;
        let resource_version = listing.resource_version.clone();
        let changed = self.merge_and_broadcast_list(listing);
        debug!(changed, %resource_version, "Deployment list merged");
        Ok(resource_version)
    }

    async fn list_and_watch(&self) -> Result<BoxStream<'static, CacheEvent>> {
        let resource_version = self.list_and_merge().await?;
        self.lister.watch(&resource_version).await
    }

    /// Keeps the cache fresh until `cancel` fires.
    ///
    /// List and watch failures are logged and retried; the only way out is
    /// cancellation, reported as `CacheError::Cancelled`.
    pub async fn start_watcher(
        &self,
        cancel: CancellationToken,
        reconcile_interval: Duration,
    ) -> Result<(), CacheError> {
        let reconcile_interval = reconcile_interval.max(Duration::from_millis(1));
        let mut reconcile = tokio::time::interval_at(Instant::now() + reconcile_interval, reconcile_interval);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(?reconcile_interval, "Starting deployment cache watcher");

        loop {
            if cancel.is_cancelled() {
                return Err(self.stopped());
            }

            // Listing
            let mut stream = match cancel.run_until_cancelled(self.list_and_watch()).await {
                None => return Err(self.stopped()),
                Some(Ok(stream)) => stream,
                Some(Err(e)) => {
                    error!("Failed to list/watch deployments, retrying: {:#}", e);
                    let backoff = RELIST_BACKOFF.min(reconcile_interval);
                    if cancel.run_until_cancelled(tokio::time::sleep(backoff)).await.is_none() {
                        return Err(self.stopped());
                    }
                    continue;
                }
            };
            // A full list just happened
            reconcile.reset();

            // Watching
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.stopped()),
                    _ = reconcile.tick() => {
                        match cancel.run_until_cancelled(self.list_and_merge()).await {
                            None => return Err(self.stopped()),
                            Some(Ok(_)) => {}
                            Some(Err(e)) => warn!("Periodic deployment reconcile failed: {:#}", e),
                        }
                    }
                    next = stream.next() => match next {
                        Some(evt) => {
                            self.merge_and_broadcast_event(evt);
                        }
                        None => {
                            debug!("Deployment watch stream closed, re-listing");
                            break;
                        }
                    },
                }
            }
        }
    }

    fn stopped(&self) -> CacheError {
        info!("Deployment cache watcher stopped");
        CacheError::Cancelled
    }
}
