//! The per-calendar update cycle and the sweep over all calendars.

use crate::calendar::health::{ErrorTracker, HealthTransition};
use crate::calendar::selection::select_due;
use crate::calendar::templating::Notices;
use crate::calendar::{CalendarConfig, CalendarKey, EventSource};
use crate::delivery::Delivery;
use crate::formatting;
use crate::metrics::{CalendarState, CycleStatus, ProcessingMetrics};
use crate::store::{Store, StoreError};
use crate::{Error, ProcessingConfig, Result};
use chrono::{DateTime, Utc};
use prometheus::Registry;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs update cycles of calendars: fetches their feeds, notifies due events to their channels
/// and keeps track of their health.
#[derive(Clone)]
pub struct Processor {
    store: Arc<dyn Store>,
    source: Arc<dyn EventSource>,
    delivery: Arc<dyn Delivery>,
    notices: Arc<Notices>,
    metrics: ProcessingMetrics,
    tracker: ErrorTracker,
    cycle_timeout: Duration,
    retention: chrono::Duration,
}

impl Processor {
    /// Creates a new `Processor`.
    pub fn new<S, E, D>(
        store: S,
        source: E,
        delivery: D,
        config: &ProcessingConfig,
    ) -> Result<Processor>
    where
        S: Store + 'static,
        E: EventSource + 'static,
        D: Delivery + 'static,
    {
        Ok(Processor {
            store: Arc::new(store),
            source: Arc::new(source),
            delivery: Arc::new(delivery),
            notices: Arc::new(Notices::new()?),
            metrics: ProcessingMetrics::new()?,
            tracker: ErrorTracker::new(config.error_threshold),
            cycle_timeout: config.cycle_timeout(),
            retention: config.notified_retention(),
        })
    }

    /// Registers the processing metrics in a prometheus registry.
    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.metrics.register(registry)
    }

    /// Runs one update cycle for every calendar.
    pub async fn update_calendars(&self) -> Result<()> {
        self.sweep(Utc::now).await
    }

    /// Like `update_calendars`, evaluating all calendars at the instant `now`.
    pub async fn update_calendars_at(&self, now: DateTime<Utc>) -> Result<()> {
        self.sweep(move || now).await
    }

    async fn sweep<F>(&self, now: F) -> Result<()>
    where
        F: Fn() -> DateTime<Utc>,
    {
        let calendars = self.store.all_calendars()?;
        log::debug!("processing {} calendars", calendars.len());

        // One at a time. A failing calendar must not stop the others.
        for calendar in &calendars {
            self.update_calendar_at(&calendar.key(), now()).await;
        }

        self.update_stats()?;
        self.metrics.sweeps_total().inc();
        self.metrics
            .latest_sweep_timestamp_seconds()
            .set(Utc::now().timestamp());

        Ok(())
    }

    fn update_stats(&self) -> Result<()> {
        let calendars = self.store.all_calendars()?;
        let users: HashSet<&str> = calendars.iter().map(|c| c.user_id.as_str()).collect();
        let enabled = calendars.iter().filter(|c| c.enabled).count();

        self.metrics.users().set(users.len() as i64);
        self.metrics
            .calendars(CalendarState::Enabled)
            .set(enabled as i64);
        self.metrics
            .calendars(CalendarState::Disabled)
            .set((calendars.len() - enabled) as i64);

        Ok(())
    }

    /// Runs one update cycle of a single calendar at `now`.
    ///
    /// Failures are recorded on the calendar, never returned.
    pub async fn update_calendar_at(&self, key: &CalendarKey, now: DateTime<Utc>) -> CycleStatus {
        // The calendar may have been changed or deleted since the sweep started.
        let calendar = match self.store.load_calendar(key) {
            Ok(calendar) => calendar,
            Err(err) => {
                log::info!("not processing calendar {key}: {err}");
                self.metrics.cycles_total(CycleStatus::Skipped).inc();
                return CycleStatus::Skipped;
            }
        };

        if !calendar.enabled {
            log::debug!("calendar {key} is disabled, skipping");
            self.metrics.cycles_total(CycleStatus::Skipped).inc();
            return CycleStatus::Skipped;
        }

        let started = Instant::now();

        let result = match tokio::time::timeout(self.cycle_timeout, self.process(&calendar, now))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.cycle_timeout)),
        }
        .and_then(|()| {
            self.store
                .update_calendar(key, &mut |calendar| self.tracker.on_success(calendar, now))
                .map_err(Error::from)
        });

        let status = match result {
            Ok(_) => {
                log::debug!("processed calendar {key}");
                CycleStatus::Success
            }
            Err(err) => {
                self.record_failure(key, &err, now).await;
                CycleStatus::Error
            }
        };

        self.metrics
            .cycle_duration_seconds(status)
            .observe(started.elapsed().as_secs_f64());
        self.metrics.cycles_total(status).inc();

        status
    }

    async fn process(&self, calendar: &CalendarConfig, now: DateTime<Utc>) -> Result<()> {
        let key = calendar.key();
        let fetched = self.source.fetch_events(&calendar.url).await?;
        log::debug!(
            "fetched {} events of calendar {key}",
            fetched.events.len()
        );

        if !calendar.verified {
            self.verify(calendar, fetched.name.as_deref()).await?;
        }

        let user = self.store.load_user(&calendar.user_id)?;
        let mut notified = self.store.load_events(&key)?;

        let pruned = notified.prune(
            fetched.events.iter().map(|event| event.id.as_str()),
            now.checked_sub_signed(self.retention)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        );
        if pruned > 0 {
            log::debug!("forgot {pruned} notifications of past events of calendar {key}");
            self.store.save_events(&key, &notified)?;
        }

        let due = select_due(&fetched.events, &user.advance, &notified, now);

        // Every due offset gets its own notification, persisted right after it was sent.
        for pair in &due {
            let text = formatting::render(&user.format, &user.language, pair.event)?;
            self.delivery.send(&calendar.channel_id, &text).await?;
            self.metrics.notifications_total().inc();

            log::info!(
                "notified event {} of calendar {key} {}h in advance",
                pair.event.id,
                pair.offset
            );

            notified.mark(&pair.event.id, pair.offset, now);
            self.store.save_events(&key, &notified)?;
        }

        Ok(())
    }

    /// Announces the calendar in its channel and to its user, then marks it verified.
    async fn verify(&self, calendar: &CalendarConfig, name: Option<&str>) -> Result<()> {
        let mut verified = calendar.clone();
        if let Some(name) = name {
            verified.name = name.to_owned();
        }
        verified.verified = true;

        let confirmation = self.notices.channel_confirmation(&verified)?;
        self.delivery
            .send(&calendar.channel_id, &confirmation)
            .await?;

        let notice = self.notices.verified(&verified)?;
        self.delivery.send(&calendar.user_id, &notice).await?;

        self.store.update_calendar(&calendar.key(), &mut |stored| {
            stored.verified = true;
            stored.name = verified.name.clone();
        })?;

        log::info!("verified calendar {}", calendar.key());
        Ok(())
    }

    async fn record_failure(&self, key: &CalendarKey, err: &Error, now: DateTime<Utc>) {
        log::warn!("failed to process calendar {key}: {err}");

        let message = err.to_string();
        let mut transition = HealthTransition::Unchanged;

        let calendar = match self.store.update_calendar(key, &mut |calendar| {
            transition = self.tracker.on_failure(calendar, &message, now);
        }) {
            Ok(calendar) => calendar,
            Err(StoreError::CalendarNotFound(_)) => {
                log::info!("calendar {key} was deleted while processing");
                return;
            }
            Err(err) => {
                log::error!("failed to record error of calendar {key}: {err}");
                return;
            }
        };

        if transition == HealthTransition::Disabled {
            log::warn!(
                "disabled calendar {key} after {} consecutive errors",
                calendar.last_errors_count
            );
        }

        let notice = if transition == HealthTransition::Disabled && calendar.verified {
            self.notices.disabled(&calendar)
        } else if !calendar.verified {
            self.notices.processing_failed(&calendar, &message)
        } else {
            return;
        };

        self.send_notice(&calendar.user_id, notice).await;
    }

    async fn send_notice(&self, destination: &str, notice: Result<String>) {
        let result = match notice {
            Ok(text) => self
                .delivery
                .send(destination, &text)
                .await
                .map_err(Error::from),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            log::error!("failed to send notice to {destination}: {err}");
        }
    }

    /// Runs an update of all calendars every `period` until a message is received via `stop`.
    async fn start_updates(&self, period: Duration, mut stop: Receiver<()>) {
        log::info!(
            "updating calendars every {:?}, disabling them after {} consecutive errors",
            period,
            self.tracker.threshold()
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.update_calendars().await {
                        log::error!("failed to update calendars: {err}");
                    }
                }
                _ = &mut stop => {
                    log::info!("stopping calendar updates");
                    return;
                }
            }
        }
    }

    /// Starts a background task updating all calendars, the first time right away. Returns an
    /// `UpdateTaskHandle` to stop the updates.
    pub async fn spawn_update_task(&self, period: Duration) -> UpdateTaskHandle {
        let processor = self.clone();
        let (stop_tx, stop_rx) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            processor.start_updates(period, stop_rx).await;
        });

        UpdateTaskHandle {
            join_handle,
            stop_tx,
        }
    }
}

/// A handle for stopping a calendar update task.
pub struct UpdateTaskHandle {
    join_handle: JoinHandle<()>,
    stop_tx: Sender<()>,
}

impl UpdateTaskHandle {
    /// Stops the update task. Blocks until the background task is finished, so an update in
    /// progress completes first.
    pub async fn stop(self) -> io::Result<()> {
        if self.stop_tx.send(()).is_ok() {
            self.join_handle.await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::notified::NotifiedState;
    use crate::calendar::{Event, FetchedCalendar, StaticEventSource, UserConfig};
    use crate::delivery::{DeliveryError, RecordingDelivery};
    use crate::store::FileStore;
    use crate::testutil::{at, event};
    use async_trait::async_trait;
    use chrono::Duration as Hours;
    use ics_feed::FeedError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves feeds by URL, fails for unknown URLs and counts fetches.
    #[derive(Default)]
    struct Feeds {
        feeds: HashMap<String, FetchedCalendar>,
        fetches: AtomicUsize,
    }

    impl Feeds {
        fn with(mut self, url: &str, name: &str, events: Vec<Event>) -> Feeds {
            self.feeds.insert(
                url.into(),
                FetchedCalendar {
                    name: Some(name.into()),
                    events,
                },
            );
            self
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for Feeds {
        async fn fetch_events(&self, url: &str) -> Result<FetchedCalendar> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.feeds.get(url).cloned().ok_or_else(|| {
                Error::Fetch(FeedError::Status {
                    url: url.into(),
                    status: 404,
                })
            })
        }
    }

    /// Records messages and rejects everything sent to one destination.
    struct Rejecting {
        destination: &'static str,
        inner: RecordingDelivery,
    }

    #[async_trait]
    impl Delivery for Rejecting {
        async fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
            if destination == self.destination {
                return Err(DeliveryError::Rejected {
                    destination: destination.into(),
                    description: "Forbidden: bot is not a member of the channel chat".into(),
                });
            }
            self.inner.send(destination, text).await
        }
    }

    fn config(error_threshold: u32) -> ProcessingConfig {
        ProcessingConfig {
            error_threshold,
            ..Default::default()
        }
    }

    /// A store with a calendar `1` of user `42` notifying to `@club`, and a `{title}` format.
    fn store(url: &str) -> (Arc<FileStore>, CalendarKey) {
        let store = Arc::new(FileStore::in_memory());
        let key = store.add_calendar("42", url, "@club").unwrap().key();
        let user = UserConfig {
            format: "{title}".into(),
            ..Default::default()
        };
        store.save_user("42", &user).unwrap();
        (store, key)
    }

    #[actix_rt::test]
    async fn new_calendar_gets_verified() {
        let now = at(2024, 1, 1, 12, 0);
        let (store, key) = store("https://club.example/cal.ics");
        let feeds = Feeds::default().with("https://club.example/cal.ics", "Club", vec![]);
        let delivery = Arc::new(RecordingDelivery::new());
        let processor =
            Processor::new(store.clone(), feeds, delivery.clone(), &config(10)).unwrap();

        processor.update_calendars_at(now).await.unwrap();
        processor.update_calendars_at(now).await.unwrap();

        let calendar = store.load_calendar(&key).unwrap();
        assert!(calendar.verified);
        assert_eq!(calendar.name, "Club");
        assert_eq!(calendar.last_process_at, Some(now));
        assert_eq!(calendar.last_process_error, None);

        assert_eq!(
            delivery.messages_to("@club"),
            vec!["Events from Club will be notified here".to_owned()]
        );
        let user_messages = delivery.messages_to("42");
        assert_eq!(user_messages.len(), 1);
        assert!(user_messages[0].starts_with("Verified calendar 1\nName: Club\n"));
    }

    #[actix_rt::test]
    async fn events_are_notified_once_per_offset() {
        let now = at(2024, 1, 1, 12, 0);
        let url = "https://club.example/cal.ics";
        let (store, key) = store(url);
        let feeds = Feeds::default().with(url, "Club", vec![event("gig", now + Hours::hours(10))]);
        let delivery = Arc::new(RecordingDelivery::new());
        let processor =
            Processor::new(store.clone(), feeds, delivery.clone(), &config(10)).unwrap();

        // 48, 24 and 12 hours are due at once, each is notified.
        processor.update_calendars_at(now).await.unwrap();
        assert_eq!(delivery.messages_to("@club").len(), 4);
        let notified = store.load_events(&key).unwrap();
        assert!(notified.contains("gig", 12) && !notified.contains("gig", 6));

        processor
            .update_calendars_at(now + Hours::hours(1))
            .await
            .unwrap();
        // The 6 hour notification fires exactly 6 hours before the start.
        processor
            .update_calendars_at(now + Hours::hours(4))
            .await
            .unwrap();
        processor
            .update_calendars_at(now + Hours::hours(5))
            .await
            .unwrap();

        assert_eq!(
            delivery.messages_to("@club"),
            vec![
                "Events from Club will be notified here".to_owned(),
                "Event gig".to_owned(),
                "Event gig".to_owned(),
                "Event gig".to_owned(),
                "Event gig".to_owned(),
            ]
        );

        let notified = store.load_events(&key).unwrap();
        for offset in [48, 24, 12, 6] {
            assert!(notified.contains("gig", offset), "offset {offset}");
        }
        assert_eq!(processor.metrics.notifications_total().get(), 4);
        assert_eq!(processor.metrics.cycles_total(CycleStatus::Success).get(), 4);
    }

    #[actix_rt::test]
    async fn failing_calendar_gets_disabled_at_threshold() {
        let now = at(2024, 1, 1, 12, 0);
        let (store, key) = store("https://broken.example/cal.ics");
        let feeds = Arc::new(Feeds::default());
        let delivery = Arc::new(RecordingDelivery::new());
        let processor =
            Processor::new(store.clone(), feeds.clone(), delivery.clone(), &config(3)).unwrap();

        for _ in 0..2 {
            processor.update_calendars_at(now).await.unwrap();
        }
        let calendar = store.load_calendar(&key).unwrap();
        assert!(calendar.enabled);
        assert_eq!(calendar.last_errors_count, 2);

        processor.update_calendars_at(now).await.unwrap();
        let calendar = store.load_calendar(&key).unwrap();
        assert!(!calendar.enabled);
        assert_eq!(calendar.last_errors_count, 3);
        assert!(calendar
            .last_process_error
            .unwrap()
            .contains("responded with HTTP status 404"));

        // Disabled calendars are not fetched anymore.
        processor.update_calendars_at(now).await.unwrap();
        assert_eq!(feeds.fetches(), 3);
        assert_eq!(processor.metrics.cycles_total(CycleStatus::Error).get(), 3);
        assert_eq!(processor.metrics.cycles_total(CycleStatus::Skipped).get(), 1);
        assert_eq!(
            processor.metrics.calendars(CalendarState::Disabled).get(),
            1
        );

        // Never verified, so every failure is reported and no disabled notice is sent.
        let user_messages = delivery.messages_to("42");
        assert_eq!(user_messages.len(), 3);
        assert!(user_messages
            .iter()
            .all(|text| text.starts_with("Failed to process calendar /cal1:\n")));
    }

    #[actix_rt::test]
    async fn verified_calendar_failures_are_silent_until_disabled() {
        let now = at(2024, 1, 1, 12, 0);
        let (store, key) = store("https://broken.example/cal.ics");
        store
            .update_calendar(&key, &mut |calendar| calendar.verified = true)
            .unwrap();
        let delivery = Arc::new(RecordingDelivery::new());
        let processor =
            Processor::new(store.clone(), Feeds::default(), delivery.clone(), &config(2)).unwrap();

        processor.update_calendars_at(now).await.unwrap();
        assert!(delivery.messages().is_empty());

        processor.update_calendars_at(now).await.unwrap();
        assert_eq!(
            delivery.messages_to("42"),
            vec!["Calendar /cal1 is disabled due too many processing errors".to_owned()]
        );
        assert!(!store.load_calendar(&key).unwrap().enabled);
    }

    #[actix_rt::test]
    async fn reenabled_calendar_is_processed_again() {
        let now = at(2024, 1, 1, 12, 0);
        let (store, key) = store("https://club.example/cal.ics");
        store
            .update_calendar(&key, &mut |calendar| {
                calendar.enabled = false;
                calendar.last_errors_count = 1;
            })
            .unwrap();
        let feeds = Arc::new(Feeds::default().with("https://club.example/cal.ics", "Club", vec![]));
        let processor = Processor::new(
            store.clone(),
            feeds.clone(),
            RecordingDelivery::new(),
            &config(1),
        )
        .unwrap();

        processor.update_calendars_at(now).await.unwrap();
        assert_eq!(feeds.fetches(), 0);

        store.set_enabled(&key, true).unwrap();
        processor.update_calendars_at(now).await.unwrap();

        assert_eq!(feeds.fetches(), 1);
        assert!(store.load_calendar(&key).unwrap().verified);
    }

    #[actix_rt::test]
    async fn one_failing_calendar_does_not_stop_others() {
        let now = at(2024, 1, 1, 12, 0);
        let (store, broken) = store("https://broken.example/cal.ics");
        let working = store
            .add_calendar("42", "https://club.example/cal.ics", "@other")
            .unwrap()
            .key();
        let feeds = Feeds::default().with(
            "https://club.example/cal.ics",
            "Club",
            vec![event("gig", now + Hours::hours(1))],
        );
        let delivery = Arc::new(RecordingDelivery::new());
        let processor =
            Processor::new(store.clone(), feeds, delivery.clone(), &config(10)).unwrap();

        processor.update_calendars_at(now).await.unwrap();

        assert_eq!(store.load_calendar(&broken).unwrap().last_errors_count, 1);
        let calendar = store.load_calendar(&working).unwrap();
        assert!(calendar.verified);
        assert_eq!(calendar.last_errors_count, 0);
        assert_eq!(
            delivery.messages_to("@other").last().map(String::as_str),
            Some("Event gig")
        );
        assert_eq!(processor.metrics.users().get(), 1);
        assert_eq!(processor.metrics.calendars(CalendarState::Enabled).get(), 2);
    }

    #[actix_rt::test]
    async fn rejected_confirmation_leaves_calendar_unverified() {
        let now = at(2024, 1, 1, 12, 0);
        let url = "https://club.example/cal.ics";
        let (store, key) = store(url);
        let feeds = Feeds::default().with(url, "Club", vec![event("gig", now + Hours::hours(1))]);
        let delivery = Arc::new(Rejecting {
            destination: "@club",
            inner: RecordingDelivery::new(),
        });
        let processor =
            Processor::new(store.clone(), feeds, delivery.clone(), &config(10)).unwrap();

        processor.update_calendars_at(now).await.unwrap();

        let calendar = store.load_calendar(&key).unwrap();
        assert!(!calendar.verified);
        assert_eq!(calendar.last_errors_count, 1);
        assert!(store.load_events(&key).unwrap().is_empty());

        let user_messages = delivery.inner.messages_to("42");
        assert_eq!(user_messages.len(), 1);
        assert!(user_messages[0].contains("bot is not a member of the channel chat"));
    }

    #[actix_rt::test]
    async fn invalid_format_fails_the_cycle() {
        let now = at(2024, 1, 1, 12, 0);
        let url = "https://club.example/cal.ics";
        let (store, key) = store(url);
        store
            .update_calendar(&key, &mut |calendar| calendar.verified = true)
            .unwrap();
        let user = UserConfig {
            format: "{title".into(),
            ..Default::default()
        };
        store.save_user("42", &user).unwrap();
        let feeds = Feeds::default().with(url, "Club", vec![event("gig", now + Hours::hours(1))]);
        let delivery = Arc::new(RecordingDelivery::new());
        let processor =
            Processor::new(store.clone(), feeds, delivery.clone(), &config(10)).unwrap();

        processor.update_calendars_at(now).await.unwrap();

        let calendar = store.load_calendar(&key).unwrap();
        assert_eq!(calendar.last_errors_count, 1);
        assert!(delivery.messages().is_empty());
        assert!(!store.load_events(&key).unwrap().contains("gig", 6));
    }

    #[actix_rt::test]
    async fn notifications_of_vanished_events_expire() {
        let now = at(2024, 1, 20, 12, 0);
        let url = "https://club.example/cal.ics";
        let (store, key) = store(url);
        store
            .update_calendar(&key, &mut |calendar| calendar.verified = true)
            .unwrap();

        let mut notified = NotifiedState::new();
        notified.mark("old", 6, now - Hours::days(10));
        notified.mark("recent", 6, now - Hours::days(1));
        notified.mark("upcoming", 48, now - Hours::days(10));
        store.save_events(&key, &notified).unwrap();

        let feeds = Feeds::default().with(url, "Club", vec![event("upcoming", now + Hours::days(3))]);
        let processor =
            Processor::new(store.clone(), feeds, RecordingDelivery::new(), &config(10)).unwrap();

        processor.update_calendars_at(now).await.unwrap();

        let notified = store.load_events(&key).unwrap();
        assert!(!notified.contains("old", 6));
        assert!(notified.contains("recent", 6));
        assert!(notified.contains("upcoming", 48));
    }

    #[actix_rt::test]
    async fn stalled_cycle_times_out() {
        struct Stalled;

        #[async_trait]
        impl EventSource for Stalled {
            async fn fetch_events(&self, _url: &str) -> Result<FetchedCalendar> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(FetchedCalendar::default())
            }
        }

        let now = at(2024, 1, 1, 12, 0);
        let (store, key) = store("https://slow.example/cal.ics");
        let mut processor =
            Processor::new(store.clone(), Stalled, RecordingDelivery::new(), &config(10)).unwrap();
        processor.cycle_timeout = Duration::from_millis(20);

        let status = processor.update_calendar_at(&key, now).await;

        assert!(matches!(status, CycleStatus::Error));
        let calendar = store.load_calendar(&key).unwrap();
        assert_eq!(calendar.last_errors_count, 1);
        assert!(calendar.last_process_error.unwrap().contains("timed out"));
    }

    #[actix_rt::test]
    async fn deleted_calendar_is_skipped() {
        let (store, key) = store("https://club.example/cal.ics");
        store.delete_calendar(&key).unwrap();
        let processor = Processor::new(
            store,
            StaticEventSource::new(Vec::<Event>::new()),
            RecordingDelivery::new(),
            &config(10),
        )
        .unwrap();

        let status = processor
            .update_calendar_at(&key, at(2024, 1, 1, 12, 0))
            .await;

        assert!(matches!(status, CycleStatus::Skipped));
    }

    #[actix_rt::test]
    async fn update_task() {
        let url = "https://club.example/cal.ics";
        let (store, _) = store(url);
        let feeds = Arc::new(Feeds::default().with(url, "Club", vec![]));
        let processor =
            Processor::new(store, feeds.clone(), RecordingDelivery::new(), &config(10)).unwrap();

        let handle = processor
            .spawn_update_task(Duration::from_millis(10))
            .await;

        tokio::time::sleep(Duration::from_millis(15)).await;

        handle.stop().await.unwrap();

        // Initial sweep + sweep after 10ms = 2 sweeps.
        assert_eq!(feeds.fetches(), 2);
        assert_eq!(processor.metrics.sweeps_total().get(), 2);

        tokio::time::sleep(Duration::from_millis(15)).await;

        // Since updates are stopped, the counter should not increase.
        assert_eq!(feeds.fetches(), 2);
    }
}
