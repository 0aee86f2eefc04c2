use std::sync::Arc;
use async_trait::async_trait;

use crate::core::state::runtime::counts::count_snapshot::CountSnapshot;

#[async_trait]
pub trait CountSnapshotRepositoryTrait: Send + Sync {

    /// Return the current snapshot as an Arc.
    /// Readers share it instead of cloning the map.
    async fn get(&self) -> Arc<CountSnapshot>;

    /// Replace the entire snapshot.
    async fn set(&self, snapshot: Arc<CountSnapshot>);
}
