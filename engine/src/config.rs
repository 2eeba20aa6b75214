//! Engine tunables
//!
//! Loaded in layers: built-in defaults, then an optional TOML file, then
//! `FIXIT_*` environment variables.
//!
//! ```toml
//! duplicate_threshold = 0.8
//! reopen_window_hours = 48
//! reopen_policy = "category_queue"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest reopen window or auto-close grace accepted (one year)
pub const MAX_WINDOW_HOURS: i64 = 24 * 366;

/// Longest SLA warning lead accepted (one week)
pub const MAX_WARNING_LEAD_MINUTES: i64 = 7 * 24 * 60;

/// Where a reopened ticket goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReopenPolicy {
    /// Hand back to the fixer who completed it, if still active; else queue
    #[default]
    OriginalFixerFirst,
    /// Always return to the category queue
    CategoryQueue,
}

impl std::str::FromStr for ReopenPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original_fixer_first" => Ok(ReopenPolicy::OriginalFixerFirst),
            "category_queue" => Ok(ReopenPolicy::CategoryQueue),
            other => Err(ConfigError::Invalid {
                key: "reopen_policy".into(),
                message: format!("unknown policy '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Similarity a submission must exceed to be flagged as a duplicate
    pub duplicate_threshold: f64,

    pub duplicate_check_timeout_ms: u64,

    /// Per-delivery budget for the notification channel
    pub notification_timeout_ms: u64,

    /// Trimmed length a rejection reason must reach
    pub min_rejection_reason_len: usize,

    /// How long after completion the reporter may reopen
    pub reopen_window_hours: i64,

    /// How long a completed ticket waits for a rating before auto-close
    pub auto_close_grace_hours: i64,

    pub sweep_interval_secs: u64,

    /// Warn this long before an SLA deadline
    pub sla_warning_lead_minutes: i64,

    pub reopen_policy: ReopenPolicy,

    /// Broadcast buffer for workflow event subscribers
    pub event_bus_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: crate::duplicate::DEFAULT_THRESHOLD,
            duplicate_check_timeout_ms: 500,
            notification_timeout_ms: 2_000,
            min_rejection_reason_len: 10,
            reopen_window_hours: 72,
            auto_close_grace_hours: 72,
            sweep_interval_secs: 300,
            sla_warning_lead_minutes: 60,
            reopen_policy: ReopenPolicy::default(),
            event_bus_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by `FIXIT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `FIXIT_*` environment variables onto this config
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup (env-shaped keys)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FIXIT_DUPLICATE_THRESHOLD") {
            self.duplicate_threshold = parse("FIXIT_DUPLICATE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("FIXIT_DUPLICATE_CHECK_TIMEOUT_MS") {
            self.duplicate_check_timeout_ms = parse("FIXIT_DUPLICATE_CHECK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("FIXIT_NOTIFICATION_TIMEOUT_MS") {
            self.notification_timeout_ms = parse("FIXIT_NOTIFICATION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("FIXIT_MIN_REJECTION_REASON_LEN") {
            self.min_rejection_reason_len = parse("FIXIT_MIN_REJECTION_REASON_LEN", &v)?;
        }
        if let Some(v) = lookup("FIXIT_REOPEN_WINDOW_HOURS") {
            self.reopen_window_hours = parse("FIXIT_REOPEN_WINDOW_HOURS", &v)?;
        }
        if let Some(v) = lookup("FIXIT_AUTO_CLOSE_GRACE_HOURS") {
            self.auto_close_grace_hours = parse("FIXIT_AUTO_CLOSE_GRACE_HOURS", &v)?;
        }
        if let Some(v) = lookup("FIXIT_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse("FIXIT_SWEEP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("FIXIT_SLA_WARNING_LEAD_MINUTES") {
            self.sla_warning_lead_minutes = parse("FIXIT_SLA_WARNING_LEAD_MINUTES", &v)?;
        }
        if let Some(v) = lookup("FIXIT_REOPEN_POLICY") {
            self.reopen_policy = v.parse()?;
        }
        if let Some(v) = lookup("FIXIT_EVENT_BUS_CAPACITY") {
            self.event_bus_capacity = parse("FIXIT_EVENT_BUS_CAPACITY", &v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.duplicate_threshold) {
            return Err(invalid("duplicate_threshold", "must be within [0, 1]"));
        }
        if self.duplicate_check_timeout_ms == 0 || self.notification_timeout_ms == 0 {
            return Err(invalid("timeouts", "must be non-zero"));
        }
        for (key, hours) in [
            ("reopen_window_hours", self.reopen_window_hours),
            ("auto_close_grace_hours", self.auto_close_grace_hours),
        ] {
            if !(0..=MAX_WINDOW_HOURS).contains(&hours) {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    message: format!("must be within 0..={}", MAX_WINDOW_HOURS),
                });
            }
        }
        if !(0..=MAX_WARNING_LEAD_MINUTES).contains(&self.sla_warning_lead_minutes) {
            return Err(ConfigError::Invalid {
                key: "sla_warning_lead_minutes".to_string(),
                message: format!("must be within 0..={}", MAX_WARNING_LEAD_MINUTES),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(invalid("sweep_interval_secs", "must be non-zero"));
        }
        if self.event_bus_capacity == 0 {
            return Err(invalid("event_bus_capacity", "must be non-zero"));
        }
        Ok(())
    }

    pub fn duplicate_check_timeout(&self) -> Duration {
        Duration::from_millis(self.duplicate_check_timeout_ms)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    // Accessors clamp so a config built without `validate` cannot panic.

    pub fn reopen_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.reopen_window_hours.clamp(0, MAX_WINDOW_HOURS))
    }

    pub fn auto_close_grace(&self) -> chrono::Duration {
        chrono::Duration::hours(self.auto_close_grace_hours.clamp(0, MAX_WINDOW_HOURS))
    }

    pub fn sla_warning_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.sla_warning_lead_minutes
                .clamp(0, MAX_WARNING_LEAD_MINUTES),
        )
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}
