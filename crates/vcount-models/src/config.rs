//! Analysis configuration supplied by the caller.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Smallest accepted interval length in seconds.
pub const MIN_INTERVAL_SECONDS: u32 = 10;
/// Largest accepted interval length in seconds.
pub const MAX_INTERVAL_SECONDS: u32 = 300;
/// Smallest accepted alert threshold.
pub const MIN_ALERT_LIMIT: u32 = 1;

/// Interval length used when the caller omits one.
pub const DEFAULT_INTERVAL_SECONDS: u32 = 60;
/// Alert threshold used when the caller omits one.
pub const DEFAULT_ALERT_LIMIT: u32 = 10;

/// Rejected analysis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Flatten validator output into one message, ordered by field name.
    fn from_validation(errors: &ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        Self(messages.join("; "))
    }
}

/// Per-run analysis parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct AnalysisConfig {
    /// Interval length in seconds
    #[validate(range(
        min = 10,
        max = 300,
        message = "interval_seconds must be between 10 and 300"
    ))]
    pub interval_seconds: u32,

    /// Alert when an interval's total count exceeds this value
    #[validate(range(min = 1, message = "alert_limit must be at least 1"))]
    pub alert_limit: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            alert_limit: DEFAULT_ALERT_LIMIT,
        }
    }
}

impl AnalysisConfig {
    /// Build and validate a configuration.
    pub fn new(interval_seconds: u32, alert_limit: u32) -> Result<Self, ConfigError> {
        let config = Self {
            interval_seconds,
            alert_limit,
        };
        config.check()?;
        Ok(config)
    }

    /// Validate the range rules.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|errors| ConfigError::from_validation(&errors))
    }

    /// Interval length as float seconds.
    pub fn interval_secs_f64(&self) -> f64 {
        f64::from(self.interval_seconds)
    }
}
