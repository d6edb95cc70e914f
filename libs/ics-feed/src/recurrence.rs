//! RRULE expansion for recurring events.

use std::ops::Range;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::parse::{localize, RawEvent};

/// Upper bound of instances generated per recurring event.
pub(crate) const MAX_INSTANCES: u16 = 512;

/// Expands a recurring event into the start times of its instances within `window`.
///
/// EXDATEs are honoured. Instances are returned in the time zone of the event's `DTSTART`.
pub(crate) fn expand(
    master: &RawEvent,
    rrule: &str,
    window: &Range<DateTime<Utc>>,
) -> Result<Vec<DateTime<Tz>>, String> {
    let tz = master.start.timezone();
    let source = rrule_source(master, rrule);

    let rrule_set: RRuleSet = source.parse().map_err(|err: rrule::RRuleError| err.to_string())?;

    // `after` and `before` are exclusive, widen the range by a second and filter afterwards.
    let utc: rrule::Tz = Utc.into();
    let second = Duration::seconds(1);
    let after = window.start.checked_sub_signed(second).unwrap_or(window.start);
    let before = window.end.checked_add_signed(second).unwrap_or(window.end);
    let result = rrule_set
        .after(after.with_timezone(&utc))
        .before(before.with_timezone(&utc))
        .all(MAX_INSTANCES);

    if result.limited {
        log::debug!(
            "expansion of event {} stopped after {} instances",
            master.uid,
            MAX_INSTANCES
        );
    }

    Ok(result
        .dates
        .into_iter()
        .map(|date| date.with_timezone(&tz))
        .filter(|date| window.contains(&date.with_timezone(&Utc)))
        .collect())
}

/// Builds the iCalendar snippet the `rrule` crate parses.
fn rrule_source(master: &RawEvent, rrule: &str) -> String {
    let tz = master.start.timezone();
    let mut lines = vec![format!("DTSTART{}", instant(&master.start))];

    lines.push(format!("RRULE:{}", normalize_until(rrule, tz)));

    for exdate in &master.exdates {
        lines.push(format!("EXDATE{}", instant(&exdate.with_timezone(&tz))));
    }

    lines.join("\n")
}

fn instant(at: &DateTime<Tz>) -> String {
    if at.timezone() == chrono_tz::UTC {
        format!(":{}", at.format("%Y%m%dT%H%M%SZ"))
    } else {
        format!(";TZID={}:{}", at.timezone().name(), at.format("%Y%m%dT%H%M%S"))
    }
}

/// Rewrites `UNTIL` to a UTC date-time.
///
/// Feeds often carry a bare date or a local time, which the parser rejects for zoned `DTSTART`s.
fn normalize_until(rrule: &str, tz: Tz) -> String {
    rrule
        .split(';')
        .map(|part| match part.strip_prefix("UNTIL=") {
            Some(until) if until.len() == 8 => format!("UNTIL={until}T235959Z"),
            Some(until) if !until.ends_with('Z') => {
                match NaiveDateTime::parse_from_str(until, "%Y%m%dT%H%M%S") {
                    Ok(naive) => format!(
                        "UNTIL={}",
                        localize(tz, naive)
                            .with_timezone(&Utc)
                            .format("%Y%m%dT%H%M%SZ")
                    ),
                    Err(_) => part.to_owned(),
                }
            }
            _ => part.to_owned(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
