use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::state::runtime::counts::count_snapshot::CountSnapshot;
use crate::core::state::runtime::counts::count_snapshot_repository_trait::CountSnapshotRepositoryTrait;

pub struct CountSnapshotRepository {
    state: Arc<RwLock<Arc<CountSnapshot>>>,
}

impl CountSnapshotRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(Arc::new(CountSnapshot::default()))),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for CountSnapshotRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CountSnapshotRepositoryTrait for CountSnapshotRepository {
    /// Return the shared Arc snapshot (zero cost).
    async fn get(&self) -> Arc<CountSnapshot> {
        self.state.read().await.clone()
    }

    /// Swap in a new snapshot; the write lock covers only the pointer swap.
    async fn set(&self, snapshot: Arc<CountSnapshot>) {
        let mut guard = self.state.write().await;
        *guard = snapshot;
    }
}
