use super::CalendarConfig;
use chrono::{DateTime, Utc};

/// Number of consecutive failed cycles after which a calendar gets disabled.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 10;

/// Outcome of recording a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HealthTransition {
    /// The calendar stays as it was.
    Unchanged,
    /// The calendar was enabled and is now disabled.
    Disabled,
}

/// Tracks consecutive processing errors of calendars and disables the ones that keep failing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ErrorTracker {
    threshold: u32,
}

impl Default for ErrorTracker {
    fn default() -> Self {
        ErrorTracker::new(DEFAULT_ERROR_THRESHOLD)
    }
}

impl ErrorTracker {
    /// Creates a tracker disabling calendars at the `threshold`-th consecutive failure.
    pub fn new(threshold: u32) -> ErrorTracker {
        ErrorTracker {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Records a successful cycle.
    pub fn on_success(&self, calendar: &mut CalendarConfig, at: DateTime<Utc>) {
        calendar.last_process_at = Some(at);
        calendar.last_process_error = None;
        calendar.last_errors_count = 0;
    }

    /// Records a failed cycle. Disables the calendar once the error count reaches the threshold.
    /// A disabled calendar is never enabled again here.
    pub fn on_failure(
        &self,
        calendar: &mut CalendarConfig,
        error: &str,
        at: DateTime<Utc>,
    ) -> HealthTransition {
        calendar.last_process_at = Some(at);
        calendar.last_process_error = Some(error.to_owned());
        calendar.last_errors_count = calendar.last_errors_count.saturating_add(1);

        if calendar.enabled && calendar.last_errors_count >= self.threshold {
            calendar.enabled = false;
            return HealthTransition::Disabled;
        }

        HealthTransition::Unchanged
    }
}
