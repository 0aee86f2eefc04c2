pub mod workload_cache;
pub mod workload_event;
pub mod workload_state;
pub mod workload_subscription;
