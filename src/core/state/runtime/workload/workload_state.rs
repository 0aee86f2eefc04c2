use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::core::client::kube_resources::Deployment;
use crate::core::state::runtime::workload::workload_event::{CacheEvent, CacheEventType};

struct Subscriber {
    id: u64,
    tx: broadcast::Sender<CacheEvent>,
}

/// Deployments of one namespace keyed by name, plus the per-name subscriber registry.
///
/// Both halves live behind the cache's single lock so that applying a change and
/// broadcasting it happen in one critical section: subscribers of a name see
/// events in exactly the order they were applied to the map.
#[derive(Default)]
pub struct WorkloadState {
    deployments: HashMap<String, Deployment>,
    subscribers: HashMap<String, Vec<Subscriber>>,

    /// Resource version of the last full list
    pub resource_version: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl WorkloadState {
    pub fn get(&self, name: &str) -> Option<&Deployment> {
        self.deployments.get(name)
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.deployments.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments.values()
    }

    /// Replaces the map with a full listing and returns one event per name whose
    /// record was added, changed or removed. Unchanged names produce nothing.
    pub fn apply_list(&mut self, items: Vec<Deployment>, resource_version: String) -> Vec<CacheEvent> {
        let mut next: HashMap<String, Deployment> = HashMap::with_capacity(items.len());
        for d in items {
            if let Some(name) = d.metadata.name.clone() {
                next.insert(name, d);
            }
        }

        let mut events = Vec::new();

        for (name, d) in &next {
            let event_type = match self.deployments.get(name) {
                None => CacheEventType::Added,
                Some(old) if old != d => CacheEventType::Modified,
                Some(_) => continue,
            };
            events.push(CacheEvent {
                event_type,
                name: name.clone(),
                deployment: d.clone(),
            });
        }

        for (name, old) in self.deployments.drain() {
            if !next.contains_key(&name) {
                events.push(CacheEvent {
                    event_type: CacheEventType::Deleted,
                    name,
                    deployment: old,
                });
            }
        }

        self.deployments = next;
        self.resource_version = resource_version;
        self.last_synced_at = Some(Utc::now());
        events
    }

    /// Applies one upstream watch event.
    ///
    /// Returns the event describing the actual change to the map, or `None` when the
    /// event was a no-op (same object already cached, delete of an unknown name).
    /// The returned type reflects the map: an `Added` for a known name becomes `Modified`
    /// and a `Modified` for an unknown name becomes `Added`.
    pub fn apply_event(&mut self, evt: CacheEvent) -> Option<CacheEvent> {
        match evt.event_type {
            CacheEventType::Added | CacheEventType::Modified => {
                let event_type = match self.deployments.get(&evt.name) {
                    None => CacheEventType::Added,
                    Some(old) if *old != evt.deployment => CacheEventType::Modified,
                    Some(_) => return None,
                };
                self.deployments.insert(evt.name.clone(), evt.deployment.clone());
                Some(CacheEvent { event_type, ..evt })
            }
            CacheEventType::Deleted => {
                let old = self.deployments.remove(&evt.name)?;
                Some(CacheEvent {
                    event_type: CacheEventType::Deleted,
                    name: evt.name,
                    deployment: old,
                })
            }
        }
    }

    /// Delivers `evt` to every live subscription for its name.
    ///
    /// Never blocks: each subscription has its own ring buffer and a full one
    /// overwrites its oldest entry.
    pub fn broadcast(&self, evt: &CacheEvent) {
        if let Some(subs) = self.subscribers.get(&evt.name) {
            for sub in subs {
                // Only fails when the receiver is already gone
                let _ = sub.tx.send(evt.clone());
            }
        }
    }

    pub fn subscribe(&mut self, name: &str, id: u64, capacity: usize) -> broadcast::Receiver<CacheEvent> {
        let (tx, rx) = broadcast::channel(capacity);
        self.subscribers
            .entry(name.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        rx
    }

    /// Drops the sender of subscription `id`; returns false if it was not registered.
    pub fn unsubscribe(&mut self, name: &str, id: u64) -> bool {
        let Some(subs) = self.subscribers.get_mut(name) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            self.subscribers.remove(name);
        }
        removed
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers.get(name).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::testing::new_deployment;

    fn types(events: &[CacheEvent]) -> Vec<(String, CacheEventType)> {
        let mut v: Vec<_> = events.iter().map(|e| (e.name.clone(), e.event_type)).collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }

    #[test]
    fn test_apply_list_diffs_against_current_map() {
        let mut state = WorkloadState::default();
        let events = state.apply_list(
            vec![new_deployment("ns", "a", 1), new_deployment("ns", "b", 1)],
            "1".into(),
        );
        assert_eq!(
            types(&events),
            vec![("a".into(), CacheEventType::Added), ("b".into(), CacheEventType::Added)]
        );

        // b unchanged, a scaled, c new, nothing removed yet
        let events = state.apply_list(
            vec![
                new_deployment("ns", "a", 3),
                new_deployment("ns", "b", 1),
                new_deployment("ns", "c", 1),
            ],
            "2".into(),
        );
        assert_eq!(
            types(&events),
            vec![("a".into(), CacheEventType::Modified), ("c".into(), CacheEventType::Added)]
        );

        let events = state.apply_list(vec![new_deployment("ns", "c", 1)], "3".into());
        assert_eq!(
            types(&events),
            vec![("a".into(), CacheEventType::Deleted), ("b".into(), CacheEventType::Deleted)]
        );
        assert_eq!(state.names(), vec!["c".to_string()]);
        assert_eq!(state.resource_version, "3");
        assert!(state.last_synced_at.is_some());
    }

    #[test]
    fn test_apply_list_skips_unnamed_objects() {
        let mut state = WorkloadState::default();
        let events = state.apply_list(vec![Deployment::default()], "1".into());
        assert!(events.is_empty());
        assert!(state.is_empty());
    }

    #[test]
    fn test_apply_event_normalizes_and_suppresses_noops() {
        let mut state = WorkloadState::default();
        let d = new_deployment("ns", "a", 1);

        let evt = CacheEvent::from_deployment(CacheEventType::Modified, d.clone()).unwrap();
        assert_eq!(state.apply_event(evt.clone()).unwrap().event_type, CacheEventType::Added);

        // Same object again: nothing changed
        assert!(state.apply_event(evt).is_none());

        let scaled = CacheEvent::from_deployment(CacheEventType::Added, new_deployment("ns", "a", 2)).unwrap();
        assert_eq!(state.apply_event(scaled).unwrap().event_type, CacheEventType::Modified);

        let del = CacheEvent::from_deployment(CacheEventType::Deleted, d).unwrap();
        let applied = state.apply_event(del.clone()).unwrap();
        assert_eq!(applied.event_type, CacheEventType::Deleted);
        // Deleted events carry the last cached object
        assert_eq!(applied.deployment.spec.unwrap().replicas, Some(2));
        assert!(state.apply_event(del).is_none());
        assert!(state.get("a").is_none());
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber_of_the_name_only() {
        let mut state = WorkloadState::default();
        let mut rx1 = state.subscribe("a", 1, 8);
        let mut rx2 = state.subscribe("a", 2, 8);
        let mut other = state.subscribe("b", 3, 8);

        let events = state.apply_list(vec![new_deployment("ns", "a", 1)], "1".into());
        for evt in &events {
            state.broadcast(evt);
        }

        assert_eq!(rx1.try_recv().unwrap().name, "a");
        assert_eq!(rx2.try_recv().unwrap().name, "a");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe() {
        let mut state = WorkloadState::default();
        let _rx = state.subscribe("a", 7, 8);
        assert_eq!(state.subscriber_count("a"), 1);
        assert!(state.unsubscribe("a", 7));
        assert!(!state.unsubscribe("a", 7));
        assert_eq!(state.subscriber_count("a"), 0);
    }
}
