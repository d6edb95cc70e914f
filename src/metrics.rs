use crate::Result;
use prometheus::{
    core::{AtomicI64, AtomicU64, GenericCounter, GenericGauge},
    histogram_opts, opts, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Registry,
};

pub const NAMESPACE: &str = "calbot";

/// Container for calendar processing metrics.
#[derive(Clone)]
pub struct ProcessingMetrics {
    calendars: IntGaugeVec,
    users: IntGauge,
    cycles_total: IntCounterVec,
    cycle_duration_seconds: HistogramVec,
    latest_sweep_timestamp_seconds: IntGauge,
    sweeps_total: IntCounter,
    notifications_total: IntCounter,
}

impl ProcessingMetrics {
    /// Creates new ProcessingMetrics.
    pub fn new() -> Result<ProcessingMetrics> {
        let calendars = IntGaugeVec::new(
            opts!("calendars", "Number of calendars").namespace(NAMESPACE),
            &["state"],
        )?;

        let users = IntGauge::with_opts(
            opts!("users", "Number of users with at least one calendar").namespace(NAMESPACE),
        )?;

        let cycles_total = IntCounterVec::new(
            opts!(
                "calendar_cycles_total",
                "Total number of calendar processing cycles"
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        let cycle_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "calendar_cycle_duration_seconds",
                "Calendar processing cycle duration in seconds"
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        let latest_sweep_timestamp_seconds = IntGauge::with_opts(
            opts!(
                "latest_sweep_timestamp_seconds",
                "UNIX timestamp seconds of the latest sweep over all calendars"
            )
            .namespace(NAMESPACE),
        )?;

        let sweeps_total = IntCounter::with_opts(
            opts!("sweeps_total", "Total number of sweeps over all calendars")
                .namespace(NAMESPACE),
        )?;

        let notifications_total = IntCounter::with_opts(
            opts!(
                "notifications_total",
                "Total number of event notifications delivered"
            )
            .namespace(NAMESPACE),
        )?;

        Ok(ProcessingMetrics {
            calendars,
            users,
            cycles_total,
            cycle_duration_seconds,
            latest_sweep_timestamp_seconds,
            sweeps_total,
            notifications_total,
        })
    }

    /// Registers the metrics in a prometheus registry.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.calendars.clone()))?;
        registry.register(Box::new(self.users.clone()))?;
        registry.register(Box::new(self.cycles_total.clone()))?;
        registry.register(Box::new(self.cycle_duration_seconds.clone()))?;
        registry.register(Box::new(self.latest_sweep_timestamp_seconds.clone()))?;
        registry.register(Box::new(self.sweeps_total.clone()))?;
        registry.register(Box::new(self.notifications_total.clone()))?;
        Ok(())
    }

    /// Provides access to the calendars gauge.
    pub fn calendars(&self, state: CalendarState) -> GenericGauge<AtomicI64> {
        self.calendars.with_label_values(&[state.as_str()])
    }

    /// Provides access to the users gauge.
    pub fn users(&self) -> GenericGauge<AtomicI64> {
        self.users.clone()
    }

    /// Provides access to the calendar cycles counter.
    pub fn cycles_total(&self, status: CycleStatus) -> GenericCounter<AtomicU64> {
        self.cycles_total.with_label_values(&[status.as_str()])
    }

    /// Provides access to the calendar cycle duration seconds histogram.
    pub fn cycle_duration_seconds(&self, status: CycleStatus) -> Histogram {
        self.cycle_duration_seconds
            .with_label_values(&[status.as_str()])
    }

    /// Provides access to the latest sweep UNIX timestamp gauge.
    pub fn latest_sweep_timestamp_seconds(&self) -> GenericGauge<AtomicI64> {
        self.latest_sweep_timestamp_seconds.clone()
    }

    /// Provides access to the sweeps counter.
    pub fn sweeps_total(&self) -> GenericCounter<AtomicU64> {
        self.sweeps_total.clone()
    }

    /// Provides access to the delivered notifications counter.
    pub fn notifications_total(&self) -> GenericCounter<AtomicU64> {
        self.notifications_total.clone()
    }
}

/// Outcome of a calendar processing cycle.
#[derive(Debug, Copy, Clone)]
pub enum CycleStatus {
    /// The cycle completed.
    Success,
    /// The cycle failed and was recorded as an error of the calendar.
    Error,
    /// The calendar was disabled, nothing was done.
    Skipped,
}

impl CycleStatus {
    /// Returns the status as a &str.
    pub fn as_str(&self) -> &str {
        match self {
            CycleStatus::Success => "success",
            CycleStatus::Error => "error",
            CycleStatus::Skipped => "skipped",
        }
    }
}

/// Processing state of a calendar.
#[derive(Debug, Copy, Clone)]
pub enum CalendarState {
    Enabled,
    Disabled,
}

impl CalendarState {
    /// Returns the state as a &str.
    pub fn as_str(&self) -> &str {
        match self {
            CalendarState::Enabled => "enabled",
            CalendarState::Disabled => "disabled",
        }
    }
}
