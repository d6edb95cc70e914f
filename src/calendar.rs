pub mod health;
pub mod notified;
pub mod selection;
pub mod templating;

use super::Result;
use crate::formatting;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use ics_feed::models::Occurrence;
use ics_feed::FeedClient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Template used until the user sets their own.
pub const DEFAULT_FORMAT: &str = "{title}\n{date:%A, %d %B %Y}\n{time} {location}\n{description}";
/// Locale used until the user sets their own.
pub const DEFAULT_LANGUAGE: &str = "en_US";
/// Hours before the event start at which notifications fire by default.
pub const DEFAULT_ADVANCE: [u32; 4] = [48, 24, 12, 6];
/// Largest accepted advance, one year in hours.
pub const MAX_ADVANCE: u32 = 366 * 24;

/// Represents a single occurrence of a calendar event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Stable identifier, unique within the calendar.
    pub id: String,
    /// The event title. May contain HTML.
    pub title: String,
    /// Start of the event in its own time zone.
    pub start: DateTime<Tz>,
    /// Whether this is a whole-day event without a start time.
    pub all_day: bool,
    /// May contain HTML.
    pub location: String,
    /// May contain HTML.
    pub description: String,
}

impl Event {
    /// Start of the event in UTC.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    /// The event shown when previewing a format.
    pub fn sample() -> Event {
        Event {
            id: "sample".into(),
            title: "This is a sample event".into(),
            start: Utc
                .with_ymd_and_hms(2017, 5, 23, 18, 30, 0)
                .single()
                .unwrap_or_default()
                .with_timezone(&chrono_tz::UTC),
            all_day: false,
            location: "Earth".into(),
            description: "<p>This is a sample event description.</p>\
                          <ul><li>It has a list</li><li>and a <a href=\"https://example.com\">link</a></li></ul>"
                .into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.title.fmt(f)
    }
}

impl From<Occurrence> for Event {
    fn from(occurrence: Occurrence) -> Self {
        Self {
            id: occurrence.id,
            title: occurrence.summary,
            start: occurrence.start,
            all_day: occurrence.all_day,
            location: occurrence.location,
            description: occurrence.description,
        }
    }
}

/// Identifies a calendar: calendar ids are only unique per user.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CalendarKey {
    pub user_id: String,
    pub calendar_id: String,
}

impl CalendarKey {
    pub fn new(user_id: impl Into<String>, calendar_id: impl Into<String>) -> CalendarKey {
        CalendarKey {
            user_id: user_id.into(),
            calendar_id: calendar_id.into(),
        }
    }
}

impl fmt::Display for CalendarKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} of user {}", self.calendar_id, self.user_id)
    }
}

/// A calendar feed a user has subscribed a channel to, together with its processing state.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CalendarConfig {
    pub id: String,
    /// The owning user. This is also the chat the user talks to the bot in.
    pub user_id: String,
    /// Display name, taken from the feed on verification.
    #[serde(default)]
    pub name: String,
    pub url: String,
    /// The channel notifications are delivered to.
    pub channel_id: String,
    pub enabled: bool,
    /// Set once the first cycle succeeded and the channel was confirmed. Never reset.
    pub verified: bool,
    pub last_process_at: Option<DateTime<Utc>>,
    pub last_process_error: Option<String>,
    /// Number of consecutive failed cycles.
    pub last_errors_count: u32,
}

impl CalendarConfig {
    /// Creates a new, enabled and not yet verified calendar.
    pub fn new(
        user_id: impl Into<String>,
        id: impl Into<String>,
        url: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> CalendarConfig {
        CalendarConfig {
            id: id.into(),
            user_id: user_id.into(),
            name: String::new(),
            url: url.into(),
            channel_id: channel_id.into(),
            enabled: true,
            verified: false,
            last_process_at: None,
            last_process_error: None,
            last_errors_count: 0,
        }
    }

    pub fn key(&self) -> CalendarKey {
        CalendarKey::new(&self.user_id, &self.id)
    }
}

/// Per-user settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    /// Notification template with `{title}`, `{date}`, `{time}`, `{location}` and
    /// `{description}` fields.
    pub format: String,
    /// Locale for dates and times, e.g. `de_DE`.
    pub language: String,
    /// Hours in advance at which events are notified, largest first.
    pub advance: Vec<u32>,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            format: DEFAULT_FORMAT.into(),
            language: DEFAULT_LANGUAGE.into(),
            advance: DEFAULT_ADVANCE.to_vec(),
        }
    }
}

impl UserConfig {
    /// Sets the advance hours from user input like `["48", "24", "6"]`.
    ///
    /// Duplicates are dropped and the hours are ordered from the largest to the smallest. Hours
    /// above `MAX_ADVANCE` are rejected.
    pub fn set_advance<I, S>(&mut self, hours: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut advance = BTreeSet::new();

        for hour in hours {
            let hour = hour.as_ref().trim();
            match hour.parse::<u32>() {
                Ok(0) => return Err(crate::Error::InvalidAdvance("0 hours".into())),
                Ok(value) if value > MAX_ADVANCE => {
                    return Err(crate::Error::InvalidAdvance(format!(
                        "{value} hours, at most {MAX_ADVANCE} are allowed"
                    )))
                }
                Ok(value) => {
                    advance.insert(value);
                }
                Err(_) => return Err(crate::Error::InvalidAdvance(format!("{hour:?}"))),
            }
        }

        if advance.is_empty() {
            return Err(crate::Error::InvalidAdvance("no hours given".into()));
        }

        self.advance = advance.into_iter().rev().collect();
        Ok(())
    }

    /// Sets a new notification template. Templates that fail to render the sample event are
    /// rejected and leave the current one in place.
    pub fn set_format(&mut self, format: &str) -> Result<()> {
        let format = format.trim();
        formatting::render(format, &self.language, &Event::sample())?;
        self.format = format.to_owned();
        Ok(())
    }
}

/// Events read from a feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedCalendar {
    /// Name the feed gives itself.
    pub name: Option<String>,
    /// Upcoming events, ordered by start.
    pub events: Vec<Event>,
}

/// Trait that needs to be implemented by a source of calendar events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches the upcoming events of the feed at `url`.
    async fn fetch_events(&self, url: &str) -> Result<FetchedCalendar>;
}

/// An `EventSource` that returns events from a static list, regardless of the URL.
pub struct StaticEventSource {
    name: Option<String>,
    events: Vec<Event>,
}

impl StaticEventSource {
    /// Creates a new `StaticEventSource` from an iterator.
    pub fn new<I>(iter: I) -> StaticEventSource
    where
        I: IntoIterator,
        I::Item: Into<Event>,
    {
        StaticEventSource {
            name: None,
            events: iter.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets the calendar name reported by the source.
    pub fn with_name(mut self, name: impl Into<String>) -> StaticEventSource {
        self.name = Some(name.into());
        self
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    async fn fetch_events(&self, _url: &str) -> Result<FetchedCalendar> {
        let mut events = self.events.clone();
        events.sort_by_key(Event::start_utc);

        Ok(FetchedCalendar {
            name: self.name.clone(),
            events,
        })
    }
}

/// An `EventSource` reading iCalendar feeds over http.
#[derive(Debug)]
pub struct IcsEventSource {
    client: FeedClient,
    lookahead: chrono::Duration,
}

impl IcsEventSource {
    /// Creates a source giving up on a feed after `timeout` and reading events up to
    /// `lookahead` into the future.
    pub fn new(timeout: Duration, lookahead: chrono::Duration) -> Result<IcsEventSource> {
        Ok(IcsEventSource {
            client: FeedClient::new(timeout)?,
            lookahead,
        })
    }
}

#[async_trait]
impl EventSource for IcsEventSource {
    async fn fetch_events(&self, url: &str) -> Result<FetchedCalendar> {
        let now = Utc::now();
        let end = now
            .checked_add_signed(self.lookahead)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let feed = self.client.get_feed(url, now..end).await?;

        Ok(FetchedCalendar {
            name: feed.name,
            events: feed.occurrences.into_iter().map(Into::into).collect(),
        })
    }
}

#[async_trait]
impl<T> EventSource for Box<T>
where
    T: EventSource + ?Sized,
{
    async fn fetch_events(&self, url: &str) -> Result<FetchedCalendar> {
        (**self).fetch_events(url).await
    }
}

#[async_trait]
impl<T> EventSource for Arc<T>
where
    T: EventSource + ?Sized,
{
    async fn fetch_events(&self, url: &str) -> Result<FetchedCalendar> {
        (**self).fetch_events(url).await
    }
}
