//! # Resource associations: activity ↔ subscriber bookkeeping.
//!
//! A concurrent bidirectional index from activities to the bus identities
//! subscribed to them, plus the focus flag providers use when they make
//! authorization decisions on upstream calls.
//!
//! The scheduler updates the index on every gain/lose subscriber, on
//! admission, end, and focus change. Unlike the rest of the scheduler state
//! this map is shared: providers read it from outside the event loop, which
//! is why it lives behind a concurrent map instead of inside the manager.

use std::collections::BTreeSet;

use dashmap::DashMap;

use crate::activity::{ActivityId, BusId};

#[derive(Debug, Default)]
struct Entry {
    subscribers: BTreeSet<BusId>,
    focused: bool,
}

/// Concurrent activity ↔ subscriber index.
#[derive(Debug, Default)]
pub struct ResourceAssociations {
    entries: DashMap<ActivityId, Entry>,
}

impl ResourceAssociations {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Records that `subscriber` receives events for `activity`.
    pub fn associate(&self, activity: ActivityId, subscriber: BusId) {
        self.entries
            .entry(activity)
            .or_default()
            .subscribers
            .insert(subscriber);
    }

    /// Drops one subscriber association.
    pub fn dissociate(&self, activity: ActivityId, subscriber: &BusId) {
        if let Some(mut entry) = self.entries.get_mut(&activity) {
            entry.subscribers.remove(subscriber);
        }
    }

    /// Drops every association for `activity` (it ended or was released).
    pub fn dissociate_all(&self, activity: ActivityId) {
        self.entries.remove(&activity);
    }

    /// Updates the focus flag visible to providers.
    pub fn set_focused(&self, activity: ActivityId, focused: bool) {
        self.entries.entry(activity).or_default().focused = focused;
    }

    /// Whether the activity is currently focused.
    pub fn is_focused(&self, activity: ActivityId) -> bool {
        self.entries
            .get(&activity)
            .map_or(false, |entry| entry.focused)
    }

    /// Which subscribers are associated with `activity`.
    pub fn subscribers_of(&self, activity: ActivityId) -> Vec<BusId> {
        self.entries
            .get(&activity)
            .map(|entry| entry.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Which activities `subscriber` is associated with.
    pub fn activities_of(&self, subscriber: &BusId) -> Vec<ActivityId> {
        let mut out: Vec<ActivityId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().subscribers.contains(subscriber))
            .map(|entry| *entry.key())
            .collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_bidirectional() {
        let assoc = ResourceAssociations::new();
        let watcher = BusId::named("com.example.watcher");

        assoc.associate(1, watcher.clone());
        assoc.associate(2, watcher.clone());
        assoc.associate(2, BusId::named("com.example.other"));

        assert_eq!(assoc.subscribers_of(2).len(), 2);
        assert_eq!(assoc.activities_of(&watcher), vec![1, 2]);

        assoc.dissociate(2, &watcher);
        assert_eq!(assoc.activities_of(&watcher), vec![1]);

        assoc.dissociate_all(1);
        assert!(assoc.subscribers_of(1).is_empty());
    }

    #[test]
    fn focus_flag_round_trips() {
        let assoc = ResourceAssociations::new();
        assert!(!assoc.is_focused(5));
        assoc.set_focused(5, true);
        assert!(assoc.is_focused(5));
        assoc.set_focused(5, false);
        assert!(!assoc.is_focused(5));
    }
}
