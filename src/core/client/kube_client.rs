use anyhow::{Context, Result};
use kube::{Client, Config};
use tracing::debug;

/// Creates a Kubernetes client configured for in-cluster or local development.
///
/// When `api_url` is set (`SCALER_K8S_API_URL`) the inferred configuration is kept
/// for credentials but requests go to the given API server.
pub async fn build_kube_client(api_url: Option<&str>) -> Result<Client> {
    let client = if let Some(api_url) = api_url {
        debug!(%api_url, "Using custom API URL from SCALER_K8S_API_URL");
        let mut config = Config::infer()
            .await
            .context("failed to infer kube config")?;
        config.cluster_url = api_url
            .parse()
            .with_context(|| format!("invalid Kubernetes API URL '{api_url}'"))?;
        Client::try_from(config).context("failed to build kube client")?
    } else {
        // In-cluster service account or local kubeconfig
        debug!("Using inferred Kubernetes configuration");
        Client::try_default()
            .await
            .context("failed to build kube client")?
    };

    debug!("Kubernetes client initialized successfully");
    Ok(client)
}
