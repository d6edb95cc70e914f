use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{Component, Property};
use icalendar::{CalendarDateTime, DatePerhapsTime};

/// A `VEVENT` component with its times resolved to time zones.
#[derive(Debug, Clone)]
pub(crate) struct RawEvent {
    pub uid: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Tz>,
    pub all_day: bool,
    pub cancelled: bool,
    pub rrule: Option<String>,
    pub exdates: Vec<DateTime<Tz>>,
    pub recurrence_id: Option<DateTime<Tz>>,
}

/// Reads a `VEVENT` component. Returns `None` for events without a usable `DTSTART`.
pub(crate) fn parse_event(vevent: &Component<'_>, default_tz: Tz) -> Option<RawEvent> {
    let summary = text_prop(vevent, "SUMMARY");

    let start = match vevent
        .find_prop("DTSTART")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
    {
        Some(start) => start,
        None => {
            log::warn!("skipping event \"{summary}\" without a valid DTSTART");
            return None;
        }
    };
    let all_day = matches!(start, DatePerhapsTime::Date(_));
    let start = resolve(start, default_tz);

    let uid = match vevent.find_prop("UID") {
        Some(uid) => uid.val.to_string(),
        // Not valid iCalendar, but some exporters do it. Derive something stable.
        None => format!("{}_{}", summary, start.format("%Y%m%dT%H%M%S")),
    };

    let cancelled = vevent
        .find_prop("STATUS")
        .map(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"))
        .unwrap_or(false);

    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(|p| parse_exdate_property(p, start.timezone()))
        .collect();

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|value| resolve(value, default_tz));

    Some(RawEvent {
        uid,
        summary,
        description: text_prop(vevent, "DESCRIPTION"),
        location: text_prop(vevent, "LOCATION"),
        start,
        all_day,
        cancelled,
        rrule: vevent.find_prop("RRULE").map(|p| p.val.to_string()),
        exdates,
        recurrence_id,
    })
}

fn text_prop(component: &Component<'_>, name: &str) -> String {
    component
        .find_prop(name)
        .map(|p| unescape(p.val.as_ref()))
        .unwrap_or_default()
}

/// Undoes the TEXT value escaping of RFC 5545 section 3.3.11.
pub(crate) fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

/// Looks up an IANA time zone by its `TZID`.
pub(crate) fn parse_tzid(tzid: &str) -> Option<Tz> {
    let name = tzid.trim().trim_matches('"').trim_start_matches('/');

    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            log::warn!("unknown time zone {name:?}");
            None
        }
    }
}

/// Resolves a local time in `tz`, picking the earlier instant on ambiguity and interpreting
/// times in a DST gap as UTC.
pub(crate) fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// UTC values stay in UTC, recurrence rules of such events repeat in UTC.
fn resolve(value: DatePerhapsTime, default_tz: Tz) -> DateTime<Tz> {
    match value {
        DatePerhapsTime::Date(date) => midnight(default_tz, date),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => dt.with_timezone(&chrono_tz::UTC),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            localize(default_tz, naive)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            localize(parse_tzid(&tzid).unwrap_or(default_tz), date_time)
        }
    }
}

fn midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    localize(tz, date.and_time(NaiveTime::MIN))
}

/// Parses an EXDATE property, which may carry several comma-separated values.
///
/// Handles `TZID=` and `VALUE=DATE` parameters as well as UTC and floating values. Values are
/// returned in `tz`, the zone of the event they belong to.
fn parse_exdate_property(prop: &Property<'_>, tz: Tz) -> Vec<DateTime<Tz>> {
    let param_tz = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
        .and_then(|tzid| parse_tzid(&tzid));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                return NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(|date| midnight(tz, date));
            }

            if let Some(utc) = s.strip_suffix('Z') {
                return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive).with_timezone(&tz));
            }

            NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                .ok()
                .map(|naive| localize(param_tz.unwrap_or(tz), naive).with_timezone(&tz))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_text_values() {
        assert_eq!(unescape(r"one\, two\; three"), "one, two; three");
        assert_eq!(unescape(r"line\nbreak\Nagain"), "line\nbreak\nagain");
        assert_eq!(unescape(r"back\\slash"), r"back\slash");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn tzid_lookup() {
        assert_eq!(parse_tzid("Europe/Berlin"), Some(chrono_tz::Europe::Berlin));
        assert_eq!(parse_tzid("\"/Europe/Moscow\""), Some(chrono_tz::Europe::Moscow));
        assert_eq!(parse_tzid("W. Europe Standard Time"), None);
    }

    #[test]
    fn localize_dst_gap() {
        let tz = chrono_tz::Europe::Berlin;
        // 02:30 does not exist on 2024-03-31 in Berlin.
        let naive = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let resolved = localize(tz, naive);
        assert_eq!(resolved.with_timezone(&Utc).naive_utc(), naive);
    }
}
