//! State-tracking core of a Kubernetes request-based autoscaler.
//!
//! Two background-refreshed views feed the scaling control loop:
//! - [`WorkloadCache`]: the deployments of one namespace, kept fresh by
//!   list + watch + periodic reconcile, with per-name change subscriptions.
//! - [`CountAggregator`]: pending-request counts polled from every ready
//!   backend of a service and merged into one snapshot per cycle.
//!
//! [`WorkloadCache`]: core::state::runtime::workload::workload_cache::WorkloadCache
//! [`CountAggregator`]: core::state::runtime::counts::count_aggregator::CountAggregator

pub mod api;
pub mod app_state;
pub mod config;
pub mod core;
pub mod errors;
pub mod routes;
