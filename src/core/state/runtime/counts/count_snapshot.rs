use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pending-request counts per host, summed over every backend that answered
/// in one poll cycle.
///
/// This snapshot:
/// - lives only in memory
/// - is replaced as a whole after each completed poll, never edited in place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountSnapshot {
    /// host → pending requests
    pub counts: HashMap<String, u64>,

    /// Completion time of the poll that produced this snapshot, `None` before the first one
    pub polled_at: Option<DateTime<Utc>>,

    /// Backends that contributed to `counts`
    pub backends_ok: usize,

    /// Backends whose query failed and were left out
    pub backends_failed: usize,
}

impl CountSnapshot {
    /// Folds per-backend reports into one snapshot; counts reported for the same
    /// host by different backends add up.
    pub fn aggregate<I>(reports: I, backends_failed: usize) -> Self
    where
        I: IntoIterator<Item = HashMap<String, u64>>,
    {
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut backends_ok = 0;

        for report in reports {
            backends_ok += 1;
            for (host, n) in report {
                let total = counts.entry(host).or_insert(0);
                *total = total.saturating_add(n);
            }
        }

        Self {
            counts,
            polled_at: Some(Utc::now()),
            backends_ok,
            backends_failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    pub fn get(&self, host: &str) -> u64 {
        self.counts.get(host).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::testing::counts;

    #[test]
    fn test_aggregate_sums_per_host() {
        let snapshot = CountSnapshot::aggregate(
            vec![counts(&[("h1", 3)]), counts(&[("h1", 2), ("h2", 5)])],
            0,
        );
        assert_eq!(snapshot.counts, counts(&[("h1", 5), ("h2", 5)]));
        assert_eq!(snapshot.backends_ok, 2);
        assert_eq!(snapshot.total(), 10);
        assert!(snapshot.polled_at.is_some());
    }

    #[test]
    fn test_aggregate_nothing() {
        let snapshot = CountSnapshot::aggregate(Vec::new(), 2);
        assert!(snapshot.counts.is_empty());
        assert_eq!(snapshot.backends_failed, 2);
        assert_eq!(snapshot.get("h1"), 0);
    }

    #[test]
    fn test_default_is_unpolled() {
        let snapshot = CountSnapshot::default();
        assert!(snapshot.polled_at.is_none());
        assert_eq!(snapshot.total(), 0);
    }
}
