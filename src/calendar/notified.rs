use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// The `(event, advance offset)` pairs of a calendar that were already announced.
///
/// Each pair remembers when it was announced so records of events that vanished from the feed
/// can be dropped after a while.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct NotifiedState {
    events: BTreeMap<String, BTreeMap<u32, DateTime<Utc>>>,
}

impl NotifiedState {
    pub fn new() -> NotifiedState {
        NotifiedState::default()
    }

    /// Returns whether the event was announced for the given offset.
    pub fn contains(&self, event_id: &str, offset: u32) -> bool {
        self.events
            .get(event_id)
            .is_some_and(|offsets| offsets.contains_key(&offset))
    }

    /// Records that the event was announced for `offset` at `at`.
    pub fn mark(&mut self, event_id: &str, offset: u32, at: DateTime<Utc>) {
        self.events
            .entry(event_id.to_owned())
            .or_default()
            .entry(offset)
            .or_insert(at);
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.events.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops the records of events not in `current` whose last announcement happened before
    /// `cutoff`. Returns the number of dropped pairs.
    pub fn prune<'a, I>(&mut self, current: I, cutoff: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let current: HashSet<&str> = current.into_iter().collect();
        let before = self.len();

        self.events.retain(|event_id, offsets| {
            current.contains(event_id.as_str())
                || offsets.values().max().is_some_and(|last| *last >= cutoff)
        });

        before - self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::at;

    #[test]
    fn mark_and_contains() {
        let mut state = NotifiedState::new();
        assert!(state.is_empty());

        state.mark("a", 24, at(2024, 1, 1, 0, 0));
        state.mark("a", 6, at(2024, 1, 1, 18, 0));
        state.mark("a", 6, at(2024, 1, 1, 19, 0));

        assert!(state.contains("a", 24));
        assert!(state.contains("a", 6));
        assert!(!state.contains("a", 12));
        assert!(!state.contains("b", 24));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn prune_keeps_current_and_recent() {
        let mut state = NotifiedState::new();
        state.mark("current", 24, at(2023, 1, 1, 0, 0));
        state.mark("recent", 24, at(2024, 1, 9, 0, 0));
        state.mark("gone", 48, at(2024, 1, 1, 0, 0));
        state.mark("gone", 24, at(2024, 1, 2, 0, 0));

        let pruned = state.prune(["current"], at(2024, 1, 8, 0, 0));

        assert_eq!(pruned, 2);
        assert!(state.contains("current", 24));
        assert!(state.contains("recent", 24));
        assert!(!state.contains("gone", 24));
    }

    #[test]
    fn serializes_as_map() {
        let mut state = NotifiedState::new();
        state.mark("a", 6, at(2024, 1, 1, 0, 0));

        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"a":{"6":"2024-01-01T00:00:00Z"}}"#);
        assert_eq!(serde_json::from_str::<NotifiedState>(&json).unwrap(), state);
    }
}
