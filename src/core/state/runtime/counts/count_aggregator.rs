use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::client::queue_counts::QueueCountClient;
use crate::core::client::services::{EndpointResolver, ServiceTarget};
use crate::core::state::runtime::counts::count_snapshot::CountSnapshot;
use crate::core::state::runtime::counts::count_snapshot_repository::CountSnapshotRepository;
use crate::core::state::runtime::counts::count_snapshot_repository_trait::CountSnapshotRepositoryTrait;

pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 64;

#[derive(Debug, Clone)]
pub struct CountAggregatorOptions {
    /// Service whose ready backends are polled
    pub target: ServiceTarget,
    pub poll_interval: Duration,
    /// Upper bound on backend queries in flight during one cycle
    pub max_concurrent_queries: usize,
}

impl CountAggregatorOptions {
    pub fn new(target: ServiceTarget, poll_interval: Duration) -> Self {
        Self {
            target,
            poll_interval,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
        }
    }
}

/// Periodically polls every ready backend of a service for its pending-request
/// counts and publishes the key-wise sum as one `CountSnapshot`.
///
/// The background loop starts in `new` and runs until the cancellation token
/// fires (or the aggregator is dropped). Readers get the last completed
/// snapshot and never wait on a poll in flight.
pub struct CountAggregator<R: CountSnapshotRepositoryTrait + 'static = CountSnapshotRepository> {
    poller: Arc<CountPoller<R>>,
    task: JoinHandle<()>,
}

impl CountAggregator<CountSnapshotRepository> {
    pub fn new(
        cancel: CancellationToken,
        resolver: Arc<dyn EndpointResolver>,
        client: QueueCountClient,
        options: CountAggregatorOptions,
    ) -> Self {
        Self::with_repository(cancel, resolver, client, options, CountSnapshotRepository::new().shared())
    }
}

impl<R: CountSnapshotRepositoryTrait + 'static> CountAggregator<R> {
    pub fn with_repository(
        cancel: CancellationToken,
        resolver: Arc<dyn EndpointResolver>,
        client: QueueCountClient,
        options: CountAggregatorOptions,
        repo: Arc<R>,
    ) -> Self {
        let poller = Arc::new(CountPoller {
            repo,
            resolver,
            client,
            target: options.target,
            limit: Arc::new(Semaphore::new(options.max_concurrent_queries.max(1))),
        });

        let poll_interval = options.poll_interval.max(Duration::from_millis(1));
        let task = tokio::spawn(poller.clone().run(cancel, poll_interval));

        Self { poller, task }
    }

    /// The most recently completed snapshot; empty before the first poll finishes.
    pub async fn counts(&self) -> Arc<CountSnapshot> {
        self.poller.repo.get().await
    }

    /// Runs one poll cycle right away, in addition to the ticker.
    pub async fn poll_now(&self) -> Result<Arc<CountSnapshot>> {
        self.poller.poll_once().await
    }

    pub fn target(&self) -> &ServiceTarget {
        &self.poller.target
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<R: CountSnapshotRepositoryTrait + 'static> Drop for CountAggregator<R> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct CountPoller<R> {
    repo: Arc<R>,
    resolver: Arc<dyn EndpointResolver>,
    client: QueueCountClient,
    target: ServiceTarget,
    limit: Arc<Semaphore>,
}

impl<R: CountSnapshotRepositoryTrait + 'static> CountPoller<R> {
    async fn run(self: Arc<Self>, cancel: CancellationToken, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(service = %self.target, ?poll_interval, "Starting count aggregator");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // Cancelling mid-cycle drops the in-flight queries without publishing
                    match cancel.run_until_cancelled(self.poll_once()).await {
                        None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => error!("Error getting request counts: {:#}", e),
                    }
                }
            }
        }

        info!(service = %self.target, "Count aggregator stopped");
    }

    /// Resolve → one task per backend → join → fold → publish.
    ///
    /// Failing backends are logged and left out. The cycle fails, and the
    /// previous snapshot stays published, when resolution fails or when
    /// backends were resolved but none of them answered. Returns the exact
    /// snapshot this cycle published.
    async fn poll_once(&self) -> Result<Arc<CountSnapshot>> {
        let addresses = self.resolver.resolve(&self.target).await?;

        let mut queries = JoinSet::new();
        for address in addresses {
            let client = self.client.clone();
            let limit = self.limit.clone();
            queries.spawn(async move {
                // The semaphore is never closed; without a permit the query just runs unthrottled
                let _permit = limit.acquire_owned().await.ok();
                let result = client.fetch_counts(&address).await;
                (address, result)
            });
        }

        let mut reports: Vec<HashMap<String, u64>> = Vec::new();
        let mut failed = 0;

        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok((address, Ok(counts))) => {
                    debug!(%address, ?counts, "Received counts from backend");
                    reports.push(counts);
                }
                Ok((address, Err(e))) => {
                    warn!(%address, "Failed to get counts from backend: {:#}", e);
                    failed += 1;
                }
                Err(e) => {
                    error!("Count query task failed: {:?}", e);
                    failed += 1;
                }
            }
        }

        if reports.is_empty() && failed > 0 {
            bail!("all {} backends of {} failed, keeping previous counts", failed, self.target);
        }

        let snapshot = Arc::new(CountSnapshot::aggregate(reports, failed));
        debug!(
            hosts = snapshot.counts.len(),
            total = snapshot.total(),
            backends_ok = snapshot.backends_ok,
            backends_failed = snapshot.backends_failed,
            "Finished getting aggregate counts"
        );
        self.repo.set(snapshot.clone()).await;

        Ok(snapshot)
    }
}
