use std::fmt;

use crate::core::client::kube_resources::Deployment;

/// Kind of change applied to one cached deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for CacheEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheEventType::Added => "ADDED",
            CacheEventType::Modified => "MODIFIED",
            CacheEventType::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// A change to one deployment, as delivered by the upstream watch stream and
/// as re-broadcast to every subscriber of `name`.
///
/// Events are value copies; receiving one grants no write access to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEvent {
    pub event_type: CacheEventType,

    /// Name of the deployment the event applies to
    pub name: String,

    /// The deployment after the change (the last known object for `Deleted`)
    pub deployment: Deployment,
}

impl CacheEvent {
    /// Builds an event keyed by the deployment's own name.
    ///
    /// Returns `None` for objects without `metadata.name`; those can never be cached.
    pub fn from_deployment(event_type: CacheEventType, deployment: Deployment) -> Option<Self> {
        let name = deployment.metadata.name.clone()?;
        Some(Self {
            event_type,
            name,
            deployment,
        })
    }
}
