use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, Weak};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use crate::core::state::runtime::workload::workload_event::CacheEvent;
use crate::core::state::runtime::workload::workload_state::WorkloadState;

/// A registration for change events of one deployment name.
///
/// Each subscription owns its own bounded queue. If the holder stops draining it,
/// the oldest queued events are overwritten and the next `recv` logs how many
/// were skipped; other subscriptions and the cache writer are never slowed down.
///
/// Dropping the subscription stops it.
pub struct Subscription {
    id: u64,
    name: String,
    rx: broadcast::Receiver<CacheEvent>,
    state: Weak<RwLock<WorkloadState>>,
    live: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        name: String,
        rx: broadcast::Receiver<CacheEvent>,
        state: Weak<RwLock<WorkloadState>>,
    ) -> Self {
        Self {
            id,
            name,
            rx,
            state,
            live: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the subscription was stopped (or the cache dropped)
    /// and every event queued before that has been drained.
    pub async fn recv(&mut self) -> Option<CacheEvent> {
        loop {
            match self.rx.recv().await {
                Ok(evt) => return Some(evt),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(name = %self.name, skipped, "Subscriber fell behind, oldest events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<CacheEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(evt) => return Some(evt),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(name = %self.name, skipped, "Subscriber fell behind, oldest events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Unregisters from the cache. Idempotent.
    ///
    /// Events queued before the call can still be drained with `recv`.
    pub fn stop(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            let mut guard = state.write().unwrap_or_else(PoisonError::into_inner);
            guard.unsubscribe(&self.name, self.id);
            debug!(name = %self.name, id = self.id, "Subscription stopped");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
