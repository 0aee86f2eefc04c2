use std::fmt;
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::{Api, Client};
use tracing::debug;

use crate::core::client::kube_resources::{EndpointSubset, Endpoints};

/// The logical service whose backends report pending-request counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub namespace: String,
    pub service: String,

    /// Numeric port (`"9090"`) or the name of an endpoint port (`"admin"`)
    pub port: String,
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.service, self.port)
    }
}

/// Resolves a service to the `host:port` addresses of its ready backends.
///
/// An empty result means no backend is ready; it is not an error.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self, target: &ServiceTarget) -> Result<Vec<String>>;
}

/// `EndpointResolver` reading the service's `Endpoints` object.
pub struct KubeEndpointResolver {
    client: Client,
}

impl KubeEndpointResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EndpointResolver for KubeEndpointResolver {
    async fn resolve(&self, target: &ServiceTarget) -> Result<Vec<String>> {
        let endpoints_api: Api<Endpoints> = Api::namespaced(self.client.clone(), &target.namespace);
        let endpoints = endpoints_api
            .get(&target.service)
            .await
            .with_context(|| format!("failed to fetch endpoints for {target}"))?;

        let addresses = ready_addresses(&endpoints, &target.port);
        debug!("Resolved {} ready address(es) for {}", addresses.len(), target);
        Ok(addresses)
    }
}

/// Collects `ip:port` (`[ip]:port` for IPv6) for every ready address of every subset.
///
/// A numeric `port` is used as-is; a named port is looked up in each subset and
/// subsets that don't expose it are skipped.
pub fn ready_addresses(endpoints: &Endpoints, port: &str) -> Vec<String> {
    let numeric = port.parse::<u16>().ok();

    endpoints
        .subsets
        .iter()
        .flatten()
        .filter_map(|subset| {
            let resolved = match numeric {
                Some(p) => i32::from(p),
                None => named_port(subset, port)?,
            };
            Some((subset, resolved))
        })
        .flat_map(|(subset, resolved)| {
            subset
                .addresses
                .iter()
                .flatten()
                .map(move |addr| host_port(&addr.ip, resolved))
        })
        .collect()
}

fn host_port(ip: &str, port: i32) -> String {
    match (ip.parse::<IpAddr>(), u16::try_from(port)) {
        (Ok(ip), Ok(port)) => SocketAddr::new(ip, port).to_string(),
        _ if ip.contains(':') => format!("[{ip}]:{port}"),
        _ => format!("{ip}:{port}"),
    }
}

fn named_port(subset: &EndpointSubset, name: &str) -> Option<i32> {
    subset
        .ports
        .as_ref()?
        .iter()
        .find(|p| p.name.as_deref() == Some(name))
        .map(|p| p.port)
}
