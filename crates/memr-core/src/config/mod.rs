//! Runtime configuration for sync timing and the remote endpoint.
//!
//! Values come from environment variables so every client (CLI, tests,
//! embedding apps) configures sync the same way. Timing options only change
//! when cycles run, never the shape of the protocol.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

pub const SYNC_ENDPOINT_VAR: &str = "MEMR_SYNC_ENDPOINT";
pub const SYNC_TOKEN_VAR: &str = "MEMR_SYNC_TOKEN";
pub const SYNC_INTERVAL_VAR: &str = "MEMR_SYNC_INTERVAL_MS";
pub const SYNC_GRACE_PERIOD_VAR: &str = "MEMR_SYNC_GRACE_PERIOD_MS";
pub const AUTOSAVE_INTERVAL_VAR: &str = "MEMR_AUTOSAVE_INTERVAL_MS";
pub const SYNC_STRATEGY_VAR: &str = "MEMR_SYNC_STRATEGY";

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(3_000);
pub const DEFAULT_SYNC_GRACE_PERIOD: Duration = Duration::from_millis(5_000);
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_millis(1_000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How the coordinator builds its outgoing batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Merge the pending change log, one change per entity
    #[default]
    ChangeLog,
    /// Send every unacknowledged record in full
    Snapshot,
}

impl SyncStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChangeLog => "changelog",
            Self::Snapshot => "snapshot",
        }
    }

    /// Whether local mutations must be written to the change log.
    pub const fn tracks_changes(self) -> bool {
        matches!(self, Self::ChangeLog)
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "changelog" | "change-log" | "log" => Ok(Self::ChangeLog),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(ConfigError::Invalid(format!(
                "{SYNC_STRATEGY_VAR} must be 'changelog' or 'snapshot', got '{other}'"
            ))),
        }
    }
}

/// Sync and autosave settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Remote base URL; `None` keeps the client local-only
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub interval: Duration,
    /// Extra slack before a missed cycle counts as overdue
    pub grace_period: Duration,
    pub autosave_interval: Duration,
    pub strategy: SyncStrategy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            interval: DEFAULT_SYNC_INTERVAL,
            grace_period: DEFAULT_SYNC_GRACE_PERIOD,
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            strategy: SyncStrategy::default(),
        }
    }
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("interval", &self.interval)
            .field("grace_period", &self.grace_period)
            .field("autosave_interval", &self.autosave_interval)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = optional_trimmed(&lookup, SYNC_ENDPOINT_VAR)
            .map(|value| value.trim_end_matches('/').to_string());
        if let Some(endpoint) = endpoint.as_deref() {
            if !is_http_url(endpoint) {
                return Err(ConfigError::Invalid(format!(
                    "{SYNC_ENDPOINT_VAR} must start with http:// or https://"
                )));
            }
        }

        let interval = duration_ms(&lookup, SYNC_INTERVAL_VAR, DEFAULT_SYNC_INTERVAL)?;
        if interval.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "{SYNC_INTERVAL_VAR} must be greater than 0"
            )));
        }

        let strategy = optional_trimmed(&lookup, SYNC_STRATEGY_VAR)
            .map(|value| value.parse::<SyncStrategy>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            endpoint,
            token: optional_trimmed(&lookup, SYNC_TOKEN_VAR),
            interval,
            grace_period: duration_ms(&lookup, SYNC_GRACE_PERIOD_VAR, DEFAULT_SYNC_GRACE_PERIOD)?,
            autosave_interval: duration_ms(
                &lookup,
                AUTOSAVE_INTERVAL_VAR,
                DEFAULT_AUTOSAVE_INTERVAL,
            )?,
            strategy,
        })
    }

    pub const fn is_remote_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Longest gap between successful cycles before sync counts as overdue.
    pub fn overdue_after(&self) -> Duration {
        self.interval + self.grace_period
    }
}

fn duration_ms(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a whole number of milliseconds")))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
