pub mod models;
mod parse;
mod recurrence;

use chrono::{DateTime, Utc};
use icalendar::parser::{read_calendar, unfold};
use models::{Feed, Occurrence};
use parse::RawEvent;
use std::collections::HashSet;
use std::ops::Range;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Error while making a http request.
    #[error("failure requesting remote resource: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{url} responded with HTTP status {status}")]
    Status { url: String, status: u16 },

    /// The document is not a valid iCalendar document.
    #[error("failed to parse calendar: {0}")]
    Parse(String),
}

/// Client for fetching iCalendar feeds over http.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    /// Creates a new client. Every request is aborted after `timeout`, the client never retries.
    pub fn new(timeout: Duration) -> Result<FeedClient, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ics-feed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(FeedClient { client })
    }

    /// Downloads the feed at `url` and expands it into the occurrences starting within `window`.
    pub async fn get_feed(
        &self,
        url: &str,
        window: Range<DateTime<Utc>>,
    ) -> Result<Feed, FeedError> {
        let url = normalize_url(url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let content = response.text().await?;
        let feed = parse_feed(&content, &window)?;

        log::debug!("fetched {} occurrences from {}", feed.occurrences.len(), url);

        Ok(feed)
    }
}

/// Rewrites `webcal://` links, which calendar apps hand out, to `https://`.
fn normalize_url(url: &str) -> String {
    let url = url.trim();

    match url.get(..9) {
        Some(scheme) if scheme.eq_ignore_ascii_case("webcal://") => {
            format!("https://{}", &url[9..])
        }
        _ => url.to_owned(),
    }
}

/// Parses an iCalendar document and expands its events into the occurrences starting within
/// `window`.
///
/// Cancelled events and cancelled instances are left out. Instances overridden by a
/// `RECURRENCE-ID` component are replaced by the override.
pub fn parse_feed(content: &str, window: &Range<DateTime<Utc>>) -> Result<Feed, FeedError> {
    if !content.contains("BEGIN:VCALENDAR") {
        return Err(FeedError::Parse("not an iCalendar document".into()));
    }

    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|err| FeedError::Parse(err.to_string()))?;

    let name = calendar
        .properties
        .iter()
        .find(|p| p.name == "X-WR-CALNAME")
        .map(|p| parse::unescape(p.val.as_ref()));

    let timezone = calendar
        .properties
        .iter()
        .find(|p| p.name == "X-WR-TIMEZONE")
        .and_then(|p| parse::parse_tzid(p.val.as_ref()))
        .unwrap_or(chrono_tz::UTC);

    let (overrides, masters): (Vec<RawEvent>, Vec<RawEvent>) = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|c| parse::parse_event(c, timezone))
        .partition(|event| event.recurrence_id.is_some());

    let overridden: HashSet<(&str, i64)> = overrides
        .iter()
        .filter_map(|event| {
            event
                .recurrence_id
                .map(|id| (event.uid.as_str(), id.timestamp()))
        })
        .collect();

    let mut occurrences = Vec::new();

    for master in masters.iter().filter(|event| !event.cancelled) {
        match &master.rrule {
            Some(rrule) => match recurrence::expand(master, rrule, window) {
                Ok(starts) => occurrences.extend(
                    starts
                        .into_iter()
                        .filter(|start| !overridden.contains(&(master.uid.as_str(), start.timestamp())))
                        .map(|start| {
                            occurrence(master, instance_id(&master.uid, &start), start, timezone)
                        }),
                ),
                Err(err) => {
                    log::warn!("skipping recurring event {}: {}", master.uid, err);
                }
            },
            None if window.contains(&master.start.with_timezone(&Utc)) => {
                occurrences.push(occurrence(master, master.uid.clone(), master.start, timezone));
            }
            None => {}
        }
    }

    for instance in overrides.iter().filter(|event| !event.cancelled) {
        if let Some(recurrence_id) = instance.recurrence_id {
            if window.contains(&instance.start.with_timezone(&Utc)) {
                let id = instance_id(&instance.uid, &recurrence_id);
                occurrences.push(occurrence(instance, id, instance.start, timezone));
            }
        }
    }

    occurrences.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

    Ok(Feed {
        name,
        timezone,
        occurrences,
    })
}

fn instance_id(uid: &str, at: &DateTime<chrono_tz::Tz>) -> String {
    format!("{}_{}", uid, at.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ"))
}

/// Builds an occurrence. Starts given in UTC are shown in the calendar's zone `display_tz`.
fn occurrence(
    event: &RawEvent,
    id: String,
    start: DateTime<chrono_tz::Tz>,
    display_tz: chrono_tz::Tz,
) -> Occurrence {
    let start = if start.timezone() == chrono_tz::UTC {
        start.with_timezone(&display_tz)
    } else {
        start
    };

    Occurrence {
        id,
        uid: event.uid.clone(),
        summary: event.summary.clone(),
        start,
        all_day: event.all_day,
        location: event.location.clone(),
        description: event.description.clone(),
    }
}
