// Kube-rs based Kubernetes client
pub mod kube_client;
pub mod kube_resources;
pub mod deployments;
pub mod services;

// Backend count endpoint
pub mod queue_counts;

#[cfg(test)]
pub(crate) mod testing;
