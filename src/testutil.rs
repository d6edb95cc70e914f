//! Helpers shared by the unit tests.

use crate::calendar::Event;
use chrono::{DateTime, TimeZone, Utc};

/// A UTC instant, panicking on invalid input.
pub(crate) fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}

/// A plain event titled after its id.
pub(crate) fn event(id: &str, start: DateTime<Utc>) -> Event {
    Event {
        id: id.into(),
        title: format!("Event {id}"),
        start: start.with_timezone(&chrono_tz::UTC),
        all_day: false,
        location: String::new(),
        description: String::new(),
    }
}
