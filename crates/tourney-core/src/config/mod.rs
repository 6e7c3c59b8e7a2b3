//! Synchronization engine configuration.
//!
//! Read from the process environment. Every value is trimmed, blank values
//! fall back to their defaults, and numeric values are range checked so a
//! bad deployment fails at startup instead of mid-sync.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::is_http_url;

/// Lowest allowed poll interval; bounds load on the submission store.
pub const MIN_INTERVAL_MINUTES: u64 = 5;
/// Poll interval used when none is configured.
pub const DEFAULT_INTERVAL_MINUTES: u64 = MIN_INTERVAL_MINUTES;
/// Highest allowed poll interval (one day).
pub const MAX_INTERVAL_MINUTES: u64 = 1_440;

/// Environment variable naming the publication store database file.
pub const DATABASE_PATH_VAR: &str = "TOURNEY_DATABASE_PATH";
/// Database file used when `TOURNEY_DATABASE_PATH` is unset.
pub const DEFAULT_DATABASE_PATH: &str = "tourney.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection settings for the submission portal.
#[derive(Clone, PartialEq, Eq)]
pub struct PortalConfig {
    /// Base URL without a trailing slash
    pub base_url: String,
    /// Optional bearer credential
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PortalConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Master switch for the whole synchronization engine
    pub enabled: bool,
    /// Present whenever `enabled` is true
    pub portal: Option<PortalConfig>,
    pub interval_minutes: u64,
    /// Delay before the first scheduled run
    pub initial_delay: Duration,
    /// Cap for rate-limit back-off
    pub max_backoff: Duration,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let enabled = parse_bool(&value_or_default(&lookup, "SYNC_ENABLED", "true"))
            .ok_or_else(|| ConfigError::Invalid("SYNC_ENABLED must be true or false".to_string()))?;

        let portal = if enabled {
            Some(parse_portal_config(&lookup)?)
        } else {
            None
        };

        let interval_minutes = parse_ranged(
            &lookup,
            "SYNC_INTERVAL_MINUTES",
            DEFAULT_INTERVAL_MINUTES,
            MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES,
        )?;
        let initial_delay_secs = parse_ranged(&lookup, "SYNC_INITIAL_DELAY_SECS", 30, 0..=3_600)?;
        let max_backoff_minutes = parse_ranged(
            &lookup,
            "SYNC_MAX_BACKOFF_MINUTES",
            60,
            MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES,
        )?;

        Ok(Self {
            enabled,
            portal,
            interval_minutes,
            initial_delay: Duration::from_secs(initial_delay_secs),
            max_backoff: Duration::from_secs(max_backoff_minutes * 60),
        })
    }

    /// Configuration with the engine switched off.
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            portal: None,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            initial_delay: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60 * 60),
        }
    }
}

fn parse_portal_config(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<PortalConfig, ConfigError> {
    let base_url = required_trimmed(lookup, "SUBMISSION_PORTAL_URL")?;
    if !is_http_url(&base_url) {
        return Err(ConfigError::Invalid(
            "SUBMISSION_PORTAL_URL must start with http:// or https://".to_string(),
        ));
    }
    let timeout_secs = parse_ranged(lookup, "SUBMISSION_PORTAL_TIMEOUT_SECS", 10, 1..=120)?;

    Ok(PortalConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        token: optional_trimmed(lookup, "SUBMISSION_PORTAL_TOKEN"),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn parse_ranged(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Trimmed value of `name`, or `default` when unset or blank
pub fn value_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
