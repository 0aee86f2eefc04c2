pub mod count_aggregator;
pub mod count_snapshot;
pub mod count_snapshot_repository;
pub mod count_snapshot_repository_trait;
