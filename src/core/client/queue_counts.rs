use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;

/// Path served by every backend replica with its local pending-request counts.
pub const DEFAULT_COUNT_PATH: &str = "/queue";

/// HTTP client for the per-backend count endpoint.
///
/// The endpoint answers `GET {path}` with a JSON object mapping host names to
/// non-negative counts, e.g. `{"app.example.com": 3}`.
#[derive(Clone)]
pub struct QueueCountClient {
    client: Client,
    path: String,
}

impl Default for QueueCountClient {
    fn default() -> Self {
        Self {
            client: Client::new(),
            path: DEFAULT_COUNT_PATH.to_string(),
        }
    }
}

impl QueueCountClient {
    pub fn new(client: Client, path: &str) -> Self {
        Self {
            client,
            path: path.to_string(),
        }
    }

    /// Builds a client whose requests time out after `timeout`.
    pub fn with_timeout(path: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build count HTTP client")?;
        Ok(Self::new(client, path))
    }

    pub fn url_for(&self, address: &str) -> String {
        format!("http://{}{}", address, self.path)
    }

    /// Fetches the counts reported by the backend at `address` (`host:port`).
    ///
    /// Transport errors, non-2xx statuses and bodies that are not a
    /// `{string: non-negative integer}` object are all errors.
    pub async fn fetch_counts(&self, address: &str) -> Result<HashMap<String, u64>> {
        let url = self.url_for(address);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned status {status}"));
        }

        resp.json::<HashMap<String, u64>>()
            .await
            .with_context(|| format!("failed to decode counts from {url}"))
    }
}
