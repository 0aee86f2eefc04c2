use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use replica_scaler_core::app_state::build_app_state;
use replica_scaler_core::config::ScalerConfig;
use replica_scaler_core::core::client::deployments::KubeDeploymentListerWatcher;
use replica_scaler_core::core::client::kube_client::build_kube_client;
use replica_scaler_core::core::client::queue_counts::QueueCountClient;
use replica_scaler_core::core::client::services::KubeEndpointResolver;
use replica_scaler_core::core::state::runtime::counts::count_aggregator::{
    CountAggregator, CountAggregatorOptions,
};
use replica_scaler_core::core::state::runtime::workload::workload_cache::WorkloadCache;
use replica_scaler_core::core::util::logging::init_tracing;
use replica_scaler_core::errors::CacheError;
use replica_scaler_core::routes::app_router;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = ScalerConfig::from_env()?;
    let _log_guard = init_tracing(&config.log)?;

    info!(
        namespace = %config.namespace,
        service = %config.target,
        "Starting replica scaler state core"
    );

    let client = build_kube_client(config.k8s_api_url.as_deref()).await?;
    let cancel = CancellationToken::new();

    // --- Deployment cache: fail fast on the initial list ---
    let lister = KubeDeploymentListerWatcher::new(client.clone(), &config.namespace);
    let workload_cache = Arc::new(WorkloadCache::new(Arc::new(lister)).await?);

    let watcher = {
        let cache = workload_cache.clone();
        let cancel = cancel.child_token();
        let interval = config.reconcile_interval;
        tokio::spawn(async move {
            match cache.start_watcher(cancel, interval).await {
                Err(CacheError::Cancelled) | Ok(()) => {}
                Err(e) => error!("Deployment cache watcher exited: {e}"),
            }
        })
    };

    // --- Count aggregator: first snapshot arrives asynchronously ---
    let count_client = QueueCountClient::with_timeout(&config.count_path, config.request_timeout)?;
    let mut options = CountAggregatorOptions::new(config.target.clone(), config.poll_interval);
    options.max_concurrent_queries = config.max_concurrent_queries;
    let count_aggregator = Arc::new(CountAggregator::new(
        cancel.child_token(),
        Arc::new(KubeEndpointResolver::new(client)),
        count_client,
        options,
    ));

    // --- Admin API ---
    let state = build_app_state(workload_cache, count_aggregator);
    let listener = TcpListener::bind(config.admin_addr)
        .await
        .with_context(|| format!("failed to bind admin API on {}", config.admin_addr))?;
    info!("Admin API listening on {}", config.admin_addr);

    axum::serve(listener, app_router().with_state(state))
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("admin API server failed")?;

    cancel.cancel();
    watcher.await.ok();
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C (or when something else cancels the token).
async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                error!("Failed to listen for shutdown signal: {e}");
                cancel.cancelled().await;
            }
        },
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
