use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// A parsed calendar feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    /// Value of `X-WR-CALNAME`, if the feed provides one.
    pub name: Option<String>,
    /// Value of `X-WR-TIMEZONE`, used for floating and all-day times.
    pub timezone: Tz,
    /// Concrete occurrences inside the requested window, ordered by start.
    pub occurrences: Vec<Occurrence>,
}

/// A single concrete occurrence of a calendar event.
///
/// Recurring events are expanded into one `Occurrence` per instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    /// Stable identity. The `UID` for single events, `UID_<instant>` for recurring instances
    /// where `<instant>` is the original (not rescheduled) start in UTC.
    pub id: String,
    /// The `UID` of the event this occurrence belongs to.
    pub uid: String,
    pub summary: String,
    pub start: DateTime<Tz>,
    /// Whether the event is a whole-day event (`DTSTART;VALUE=DATE`).
    pub all_day: bool,
    pub location: String,
    pub description: String,
}

impl Occurrence {
    /// Start of the occurrence in UTC.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }
}
