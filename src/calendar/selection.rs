use super::notified::NotifiedState;
use super::Event;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// An event together with the advance offset it is due for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuePair<'a> {
    pub event: &'a Event,
    /// Hours before the event start.
    pub offset: u32,
}

impl DuePair<'_> {
    /// The instant at which the notification for this pair fires.
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        fire_at(self.event, self.offset)
    }
}

/// `None` when the instant is out of the representable range, such a pair is never due.
fn fire_at(event: &Event, offset: u32) -> Option<DateTime<Utc>> {
    event
        .start_utc()
        .checked_sub_signed(Duration::hours(offset.into()))
}

/// Selects the `(event, offset)` pairs that are due at `now`.
///
/// A pair is due when `start - offset <= now < start` and it is not in `notified`. The result is
/// ordered by event start, then event id, then offset from the largest to the smallest, so pairs
/// of the same event are adjacent. Selecting has no side effects.
pub fn select_due<'a>(
    events: &'a [Event],
    advance: &[u32],
    notified: &NotifiedState,
    now: DateTime<Utc>,
) -> Vec<DuePair<'a>> {
    let offsets: BTreeSet<u32> = advance.iter().copied().collect();

    let mut due: Vec<DuePair<'a>> = events
        .iter()
        .filter(|event| now < event.start_utc())
        .flat_map(|event| {
            offsets
                .iter()
                .rev()
                .filter(move |&&offset| fire_at(event, offset).is_some_and(|at| at <= now))
                .filter(move |&&offset| !notified.contains(&event.id, offset))
                .map(move |&offset| DuePair { event, offset })
        })
        .collect();

    due.sort_by(|a, b| {
        a.event
            .start_utc()
            .cmp(&b.event.start_utc())
            .then_with(|| a.event.id.cmp(&b.event.id))
            .then_with(|| b.offset.cmp(&a.offset))
    });

    due
}
