use std::sync::Arc;

use crate::core::state::runtime::counts::count_aggregator::CountAggregator;
use crate::core::state::runtime::workload::workload_cache::WorkloadCache;

/// Handles to the long-lived state shared by the admin API handlers.
#[derive(Clone)]
pub struct AppState {
    pub workload_cache: Arc<WorkloadCache>,
    pub count_aggregator: Arc<CountAggregator>,
}

pub fn build_app_state(
    workload_cache: Arc<WorkloadCache>,
    count_aggregator: Arc<CountAggregator>,
) -> AppState {
    AppState {
        workload_cache,
        count_aggregator,
    }
}
