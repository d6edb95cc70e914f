use super::CalendarConfig;
use crate::Result;
use minijinja::{context, Environment};

const CHANNEL_CONFIRMATION: &str = "Events from {{ name }} will be notified here";

const VERIFIED: &str = "Verified calendar {{ calendar.id }}
Name: {{ calendar.name }}
URL: {{ calendar.url }}
Channel: {{ calendar.channel_id }}";

const PROCESSING_FAILED: &str = "Failed to process calendar /cal{{ calendar.id }}:
{{ error }}";

const DISABLED: &str =
    "Calendar /cal{{ calendar.id }} is disabled due too many processing errors";

/// Renders the messages sent to channels and users about the state of their calendars.
#[derive(Debug)]
pub struct Notices {
    env: Environment<'static>,
}

impl Notices {
    pub fn new() -> Result<Notices> {
        let mut env = Environment::new();
        env.add_template("channel_confirmation", CHANNEL_CONFIRMATION)?;
        env.add_template("verified", VERIFIED)?;
        env.add_template("processing_failed", PROCESSING_FAILED)?;
        env.add_template("disabled", DISABLED)?;

        Ok(Notices { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    /// Announces a calendar in its channel. `name` falls back to the URL for unnamed feeds.
    pub fn channel_confirmation(&self, calendar: &CalendarConfig) -> Result<String> {
        let name = if calendar.name.is_empty() {
            &calendar.url
        } else {
            &calendar.name
        };

        self.render("channel_confirmation", context! { name })
    }

    /// Tells the user their calendar was verified.
    pub fn verified(&self, calendar: &CalendarConfig) -> Result<String> {
        self.render("verified", context! { calendar })
    }

    /// Tells the user a cycle of their not yet verified calendar failed.
    pub fn processing_failed(&self, calendar: &CalendarConfig, error: &str) -> Result<String> {
        self.render("processing_failed", context! { calendar, error })
    }

    /// Tells the user their calendar was disabled.
    pub fn disabled(&self, calendar: &CalendarConfig) -> Result<String> {
        self.render("disabled", context! { calendar })
    }
}
