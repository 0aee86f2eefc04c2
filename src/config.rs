//! Process configuration, read from `SCALER_*` environment variables
//! (optionally seeded from a `.env` file by `main`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::core::client::queue_counts::DEFAULT_COUNT_PATH;
use crate::core::client::services::ServiceTarget;
use crate::core::state::runtime::counts::count_aggregator::DEFAULT_MAX_CONCURRENT_QUERIES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `info,replica_scaler_core=debug`
    pub filter: String,
    /// Also write daily-rolling log files here when set
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ScalerConfig {
    /// Namespace of the cached deployments
    pub namespace: String,
    /// Service whose backends report pending-request counts
    pub target: ServiceTarget,
    pub count_path: String,
    pub poll_interval: Duration,
    pub reconcile_interval: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_queries: usize,
    pub admin_addr: SocketAddr,
    pub k8s_api_url: Option<String>,
    pub log: LogConfig,
}

impl ScalerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let namespace = get("SCALER_NAMESPACE").unwrap_or_else(|| "default".to_string());
        let service = get("SCALER_TARGET_SERVICE")
            .ok_or_else(|| anyhow!("SCALER_TARGET_SERVICE must be set"))?;
        let port = get("SCALER_TARGET_ADMIN_PORT").unwrap_or_else(|| "9090".to_string());

        let count_path = get("SCALER_COUNT_PATH").unwrap_or_else(|| DEFAULT_COUNT_PATH.to_string());
        if !count_path.starts_with('/') {
            bail!("SCALER_COUNT_PATH must start with '/', got '{count_path}'");
        }

        Ok(Self {
            target: ServiceTarget {
                namespace: namespace.clone(),
                service,
                port,
            },
            namespace,
            count_path,
            poll_interval: millis(&get, "SCALER_POLL_INTERVAL_MS", 500)?,
            reconcile_interval: millis(&get, "SCALER_RECONCILE_INTERVAL_MS", 1000)?,
            request_timeout: millis(&get, "SCALER_REQUEST_TIMEOUT_MS", 2000)?,
            max_concurrent_queries: positive(&get, "SCALER_MAX_CONCURRENT_QUERIES", DEFAULT_MAX_CONCURRENT_QUERIES)?,
            admin_addr: parsed(&get, "SCALER_ADMIN_ADDR", "0.0.0.0:8080")?,
            k8s_api_url: get("SCALER_K8S_API_URL"),
            log: LogConfig {
                filter: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                dir: get("SCALER_LOG_DIR").map(PathBuf::from),
            },
        })
    }
}

fn parsed<T, G>(get: &G, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    raw.parse::<T>()
        .with_context(|| format!("invalid value '{raw}' for {key}"))
}

fn positive<G>(get: &G, key: &str, default: usize) -> Result<usize>
where
    G: Fn(&str) -> Option<String>,
{
    let value: usize = parsed(get, key, &default.to_string())?;
    if value == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(value)
}

fn millis<G>(get: &G, key: &str, default: u64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let ms = positive(get, key, default as usize)?;
    Ok(Duration::from_millis(ms as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ScalerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ScalerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("SCALER_TARGET_SERVICE", "interceptor-admin")]).unwrap();
        assert_eq!(cfg.namespace, "default");
        assert_eq!(cfg.target.to_string(), "default/interceptor-admin:9090");
        assert_eq!(cfg.count_path, "/queue");
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.reconcile_interval, Duration::from_secs(1));
        assert_eq!(cfg.request_timeout, Duration::from_secs(2));
        assert_eq!(cfg.max_concurrent_queries, DEFAULT_MAX_CONCURRENT_QUERIES);
        assert_eq!(cfg.admin_addr.to_string(), "0.0.0.0:8080");
        assert!(cfg.k8s_api_url.is_none());
        assert_eq!(cfg.log.filter, "info");
        assert!(cfg.log.dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("SCALER_NAMESPACE", "apps"),
            ("SCALER_TARGET_SERVICE", "interceptor-admin"),
            ("SCALER_TARGET_ADMIN_PORT", "admin"),
            ("SCALER_POLL_INTERVAL_MS", "250"),
            ("SCALER_ADMIN_ADDR", "127.0.0.1:9000"),
            ("SCALER_LOG_DIR", "/var/log/scaler"),
            ("SCALER_K8S_API_URL", " https://10.0.0.1:6443 "),
        ])
        .unwrap();
        assert_eq!(cfg.target.namespace, "apps");
        assert_eq!(cfg.target.port, "admin");
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.admin_addr.port(), 9000);
        assert_eq!(cfg.log.dir, Some(PathBuf::from("/var/log/scaler")));
        assert_eq!(cfg.k8s_api_url.as_deref(), Some("https://10.0.0.1:6443"));
    }

    #[test]
    fn test_missing_service_is_error() {
        assert!(config(&[]).is_err());
        assert!(config(&[("SCALER_TARGET_SERVICE", "  ")]).is_err());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let base = ("SCALER_TARGET_SERVICE", "svc");
        assert!(config(&[base, ("SCALER_POLL_INTERVAL_MS", "0")]).is_err());
        assert!(config(&[base, ("SCALER_RECONCILE_INTERVAL_MS", "soon")]).is_err());
        assert!(config(&[base, ("SCALER_ADMIN_ADDR", "localhost")]).is_err());
        assert!(config(&[base, ("SCALER_COUNT_PATH", "queue")]).is_err());
    }
}
