//! Polling policies and the string-keyed parameter bundle.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_DELAY_MILLIS, PARAM_DELAY_MILLIS, PARAM_IGNORE_DELETES, PARAM_IGNORE_MISSING,
    PARAM_INITIAL_DELAY_MILLIS,
};

/// A parameter bundle entry that could not be read as its expected type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter `{key}` is required")]
    Missing { key: String },

    #[error("parameter `{key}` must be a non-negative integer (milliseconds), got `{value}`")]
    NotAnInteger { key: String, value: String },

    #[error("parameter `{key}` must be `true` or `false`, got `{value}`")]
    NotABoolean { key: String, value: String },
}

/// How a single source refreshes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Wait before the first scheduled refresh.
    pub initial_delay: Duration,
    /// Wait between the end of one refresh and the start of the next.
    pub interval: Duration,
    /// Keep keys that disappear upstream instead of removing them.
    pub ignore_deletes: bool,
}

impl PollingPolicy {
    pub fn new(initial_delay: Duration, interval: Duration, ignore_deletes: bool) -> Self {
        Self {
            initial_delay,
            interval,
            ignore_deletes,
        }
    }

    /// Convenience constructor taking millisecond values.
    pub fn from_millis(initial_delay_millis: u64, delay_millis: u64, ignore_deletes: bool) -> Self {
        Self::new(
            Duration::from_millis(initial_delay_millis),
            Duration::from_millis(delay_millis),
            ignore_deletes,
        )
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::from_millis(DEFAULT_DELAY_MILLIS, DEFAULT_DELAY_MILLIS, false)
    }
}

/// Typed view of the parameter bundle used by mixed database/location builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationParameters {
    pub policy: PollingPolicy,
    pub ignore_missing: bool,
}

impl AggregationParameters {
    /// Read the bundle keys `initialDelayMillis`, `delayMillis`,
    /// `ignoreDeletesFromSource` and `ignoreResourceNotFound`.
    ///
    /// Both delays are required. Absent flags read as `false`.
    pub fn from_map(bundle: &HashMap<String, String>) -> Result<Self, ParameterError> {
        let initial_delay = millis(bundle, PARAM_INITIAL_DELAY_MILLIS)?;
        let delay = millis(bundle, PARAM_DELAY_MILLIS)?;
        let ignore_deletes = flag(bundle, PARAM_IGNORE_DELETES)?;
        let ignore_missing = flag(bundle, PARAM_IGNORE_MISSING)?;

        Ok(Self {
            policy: PollingPolicy::from_millis(initial_delay, delay, ignore_deletes),
            ignore_missing,
        })
    }

    /// Render back into the string bundle.
    pub fn to_map(&self) -> HashMap<String, String> {
        parameter_map(
            self.policy.interval.as_millis() as u64,
            self.policy.initial_delay.as_millis() as u64,
            self.policy.ignore_deletes,
            self.ignore_missing,
        )
    }
}

/// Build a parameter bundle from typed values.
pub fn parameter_map(
    delay_millis: u64,
    initial_delay_millis: u64,
    ignore_deletes: bool,
    ignore_missing: bool,
) -> HashMap<String, String> {
    HashMap::from([
        (PARAM_DELAY_MILLIS.to_string(), delay_millis.to_string()),
        (
            PARAM_INITIAL_DELAY_MILLIS.to_string(),
            initial_delay_millis.to_string(),
        ),
        (PARAM_IGNORE_DELETES.to_string(), ignore_deletes.to_string()),
        (PARAM_IGNORE_MISSING.to_string(), ignore_missing.to_string()),
    ])
}

fn millis(bundle: &HashMap<String, String>, key: &str) -> Result<u64, ParameterError> {
    let raw = bundle.get(key).ok_or_else(|| ParameterError::Missing {
        key: key.to_string(),
    })?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ParameterError::NotAnInteger {
            key: key.to_string(),
            value: raw.clone(),
        })
}

fn flag(bundle: &HashMap<String, String>, key: &str) -> Result<bool, ParameterError> {
    let Some(raw) = bundle.get(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParameterError::NotABoolean {
            key: key.to_string(),
            value: raw.clone(),
        }),
    }
}
