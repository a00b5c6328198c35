//! Retry configuration with type-safe validation.
//!
//! Settings use `nutype` validation so that an out-of-range retry budget or
//! delay cannot be constructed. Nothing here is global: a [`RetrySettings`]
//! value is handed to each [`DocumentOperations`](crate::DocumentOperations).

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Environment variable for [`RetrySettings::max_attempts`].
pub const ENV_MAX_ATTEMPTS: &str = "SEARCHCORE_RETRY_MAX_ATTEMPTS";
/// Environment variable for [`RetrySettings::delay_ms`].
pub const ENV_DELAY_MS: &str = "SEARCHCORE_RETRY_DELAY_MS";
/// Environment variable for [`RetrySettings::flush_max_attempts`].
pub const ENV_FLUSH_MAX_ATTEMPTS: &str = "SEARCHCORE_FLUSH_MAX_ATTEMPTS";
/// Environment variable for [`RetrySettings::flush_delay_ms`].
pub const ENV_FLUSH_DELAY_MS: &str = "SEARCHCORE_FLUSH_DELAY_MS";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY_MS: u64 = 1_500;
const DEFAULT_FLUSH_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_FLUSH_DELAY_MS: u64 = 500;

/// Maximum number of retries after the initial attempt.
///
/// Validated to be at most 100 so a misconfiguration cannot turn a request
/// into an effectively unbounded loop. Zero disables retries.
#[nutype(
    validate(less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxRetryAttempts(u32);

/// Fixed delay between attempts in milliseconds.
///
/// Validated to be at most 10 minutes.
#[nutype(
    validate(less_or_equal = 600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryDelayMs(u64);

impl RetryDelayMs {
    /// Convert to [`Duration`] for use with `tokio::time::sleep`.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Errors raised while loading [`RetrySettings`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The variable is set but is not an unsigned integer.
    #[error("{name} must be an unsigned integer, got {value:?}")]
    NotANumber {
        /// Variable name.
        name: &'static str,
        /// Raw value as read.
        value: String,
    },

    /// The variable parses but lies outside the allowed range.
    #[error("{name}={value} is out of range")]
    OutOfRange {
        /// Variable name.
        name: &'static str,
        /// Parsed value.
        value: u64,
    },
}

/// Retry budgets for document operations and their nested translog flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first call of a document operation.
    pub max_attempts: MaxRetryAttempts,
    /// Delay between document operation attempts.
    pub delay_ms: RetryDelayMs,
    /// Retries after the first call of a translog flush.
    pub flush_max_attempts: MaxRetryAttempts,
    /// Delay between translog flush attempts.
    pub flush_delay_ms: RetryDelayMs,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: MaxRetryAttempts::try_new(DEFAULT_MAX_ATTEMPTS)
                .expect("default max attempts is within bounds"),
            delay_ms: RetryDelayMs::try_new(DEFAULT_DELAY_MS)
                .expect("default delay is within bounds"),
            flush_max_attempts: MaxRetryAttempts::try_new(DEFAULT_FLUSH_MAX_ATTEMPTS)
                .expect("default flush max attempts is within bounds"),
            flush_delay_ms: RetryDelayMs::try_new(DEFAULT_FLUSH_DELAY_MS)
                .expect("default flush delay is within bounds"),
        }
    }
}

impl RetrySettings {
    /// Settings with the given document-operation budget and default flush budget.
    pub fn new(max_attempts: MaxRetryAttempts, delay_ms: RetryDelayMs) -> Self {
        Self {
            max_attempts,
            delay_ms,
            ..Self::default()
        }
    }

    /// Replace the budget of the nested translog flush.
    #[must_use]
    pub const fn with_flush(mut self, max_attempts: MaxRetryAttempts, delay_ms: RetryDelayMs) -> Self {
        self.flush_max_attempts = max_attempts;
        self.flush_delay_ms = delay_ms;
        self
    }

    /// Load settings from `SEARCHCORE_*` environment variables.
    ///
    /// Unset variables fall back to defaults; set but invalid ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(name)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::NotANumber { name, value: raw })
                })
                .transpose()
        };

        Ok(Self {
            max_attempts: read(ENV_MAX_ATTEMPTS)?
                .map(|value| attempts(ENV_MAX_ATTEMPTS, value))
                .transpose()?
                .unwrap_or(defaults.max_attempts),
            delay_ms: read(ENV_DELAY_MS)?
                .map(|value| delay(ENV_DELAY_MS, value))
                .transpose()?
                .unwrap_or(defaults.delay_ms),
            flush_max_attempts: read(ENV_FLUSH_MAX_ATTEMPTS)?
                .map(|value| attempts(ENV_FLUSH_MAX_ATTEMPTS, value))
                .transpose()?
                .unwrap_or(defaults.flush_max_attempts),
            flush_delay_ms: read(ENV_FLUSH_DELAY_MS)?
                .map(|value| delay(ENV_FLUSH_DELAY_MS, value))
                .transpose()?
                .unwrap_or(defaults.flush_delay_ms),
        })
    }

    /// Policy for one document operation, labelled `operation`.
    pub fn policy(&self, operation: impl Into<String>) -> RetryPolicy {
        RetryPolicy::new(
            operation,
            self.max_attempts.into_inner(),
            self.delay_ms.as_duration(),
        )
    }

    /// Policy for the nested translog flush.
    pub fn flush_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            "flush",
            self.flush_max_attempts.into_inner(),
            self.flush_delay_ms.as_duration(),
        )
    }
}

fn attempts(name: &'static str, value: u64) -> Result<MaxRetryAttempts, ConfigError> {
    u32::try_from(value)
        .ok()
        .and_then(|value| MaxRetryAttempts::try_new(value).ok())
        .ok_or(ConfigError::OutOfRange { name, value })
}

fn delay(name: &'static str, value: u64) -> Result<RetryDelayMs, ConfigError> {
    RetryDelayMs::try_new(value).map_err(|_| ConfigError::OutOfRange { name, value })
}
