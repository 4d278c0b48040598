//! Server configuration and its defaults.

use std::env;
use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;

/// Address the server listens on when none is configured.
pub const DEFAULT_ADDRESS: &str = "localhost:8080";

/// Grace period used when none, or a zero one, is configured.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Environment variable overriding the listen address.
pub const ADDRESS_VAR: &str = "SCHEME_SIMULATOR_ADDRESS";

/// Environment variable overriding the grace period, in milliseconds.
pub const GRACE_PERIOD_VAR: &str = "SCHEME_SIMULATOR_GRACE_PERIOD_MS";

/// Errors loading a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The grace period variable is not a whole number of milliseconds.
    #[error("invalid SCHEME_SIMULATOR_GRACE_PERIOD_MS value {value:?}: {source}")]
    InvalidGracePeriod {
        /// The rejected value.
        value: String,
        /// Why it could not be parsed.
        #[source]
        source: ParseIntError,
    },
}

/// Server configuration. Built once at startup and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    address: String,
    grace_period: Duration,
}

impl Config {
    /// Configuration listening on `address` with the default grace period.
    pub fn new(address: impl Into<String>) -> Self {
        Config {
            address: address.into(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Set how long shutdown waits for connections to finish before cancelling them.
    ///
    /// A zero duration selects [`DEFAULT_GRACE_PERIOD`].
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Load the configuration from [`ADDRESS_VAR`] and [`GRACE_PERIOD_VAR`], falling back to the
    /// defaults for anything unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(address) = non_empty_var(ADDRESS_VAR) {
            config.address = address;
        }
        if let Some(value) = non_empty_var(GRACE_PERIOD_VAR) {
            let millis = value
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidGracePeriod { value, source })?;
            config.grace_period = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// The `host:port` address to listen on.
    pub fn address(&self) -> &str {
        if self.address.is_empty() {
            DEFAULT_ADDRESS
        } else {
            &self.address
        }
    }

    /// The effective grace period.
    pub fn grace_period(&self) -> Duration {
        if self.grace_period.is_zero() {
            DEFAULT_GRACE_PERIOD
        } else {
            self.grace_period
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(DEFAULT_ADDRESS)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
