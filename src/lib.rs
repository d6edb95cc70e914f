use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod calendar;
pub mod delivery;
pub mod formatting;
pub mod metrics;
pub mod processing;
pub mod store;

#[cfg(test)]
mod testutil;

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by all fallible operations within this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Fetch(#[from] ics_feed::FeedError),
    #[error(transparent)]
    Format(#[from] formatting::FormatError),
    #[error(transparent)]
    Delivery(#[from] delivery::DeliveryError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("invalid advance hours: {0}")]
    InvalidAdvance(String),
    #[error("calendar processing timed out after {0:?}")]
    Timeout(Duration),
}

/// Bot API configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct BotConfig {
    /// The bot token.
    pub token: String,
    /// Base URL of the bot API.
    pub api_url: String,
    /// Timeout of a single API request in seconds.
    pub timeout_secs: u64,
}

impl BotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Calendar processing configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ProcessingConfig {
    /// Period of the update sweep in seconds.
    pub interval_secs: u64,
    /// Number of consecutive failures after which a calendar gets disabled.
    pub error_threshold: u32,
    /// Timeout for downloading a calendar feed in seconds.
    pub fetch_timeout_secs: u64,
    /// Timeout for a whole calendar cycle in seconds.
    pub cycle_timeout_secs: u64,
    /// How many days ahead events are read from the feeds.
    pub lookahead_days: u32,
    /// How many days notification records of vanished events are kept.
    pub notified_retention_days: u32,
}

impl ProcessingConfig {
    /// Largest accepted `lookahead_days` and `notified_retention_days`, about ten years.
    pub const MAX_DAYS: u32 = 3660;

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn lookahead(&self) -> chrono::Duration {
        chrono::Duration::days(self.lookahead_days.into())
    }

    pub fn notified_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.notified_retention_days.into())
    }

    /// Rejects day counts that don't fit into date arithmetic.
    pub fn validate(&self) -> Result<()> {
        for (name, days) in [
            ("lookahead_days", self.lookahead_days),
            ("notified_retention_days", self.notified_retention_days),
        ] {
            if days > Self::MAX_DAYS {
                return Err(config::ConfigError::Message(format!(
                    "processing.{name} is {days}, at most {} is allowed",
                    Self::MAX_DAYS
                ))
                .into());
            }
        }

        Ok(())
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            interval_secs: 3600,
            error_threshold: calendar::health::DEFAULT_ERROR_THRESHOLD,
            fetch_timeout_secs: 30,
            cycle_timeout_secs: 300,
            lookahead_days: 30,
            notified_retention_days: 7,
        }
    }
}

/// State store configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct StoreConfig {
    /// Path of the JSON file holding users, calendars and notification state.
    pub path: PathBuf,
}

/// Metrics server configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    /// Address on which the metrics server will listen.
    pub listen_addr: SocketAddr,
}

/// Global application configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AppConfig {
    /// Bot API configuration section.
    pub bot: BotConfig,
    /// Processing configuration section.
    pub processing: ProcessingConfig,
    /// Store configuration section.
    pub store: StoreConfig,
    /// Server configuration section.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Loads the application configuration from files in the `config/` directory and environment
    /// variables.
    pub fn load() -> Result<AppConfig> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        log::info!("loading configuration using {} environment", app_env);

        let config: AppConfig = Config::builder()
            // Configuration defaults from `config/default.toml`.
            .add_source(File::with_name("config/default"))
            // Optional environment specific config overrides, e.g. `config/production.toml`.
            .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
            // Optional local config overrides from `config/local.toml` (on .gitignore).
            .add_source(File::with_name("config/local").required(false))
            // Config from environment variables prefixed with `CALBOT_`.
            .add_source(
                Environment::with_prefix("CALBOT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.processing.validate()?;

        // Don't leak the token into the logs.
        log::debug!(
            "loaded configuration: {:?} {:?} {:?}",
            config.processing,
            config.store,
            config.server
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_day_counts_are_bounded() {
        assert!(ProcessingConfig::default().validate().is_ok());

        let config = ProcessingConfig {
            lookahead_days: ProcessingConfig::MAX_DAYS,
            notified_retention_days: ProcessingConfig::MAX_DAYS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = ProcessingConfig {
            lookahead_days: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ProcessingConfig {
            notified_retention_days: ProcessingConfig::MAX_DAYS + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
