//! Service configuration loaded from environment variables.

use std::time::Duration;

use chrono::TimeDelta;

/// Invalid or missing configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Settings shared by every application and the outbox relay.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// HMAC key for access and refresh tokens (at least 32 bytes).
    pub token_symmetric_key: String,
    pub access_token_duration: TimeDelta,
    pub refresh_token_duration: TimeDelta,
    /// Upper bound on any single application call.
    pub operation_timeout: Duration,
    /// Report an unknown username at login as invalid credentials.
    pub conceal_unknown_users: bool,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: i64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `DATABASE_URL`                 | required |
    /// | `DATABASE_MAX_CONNECTIONS`     | `20`    |
    /// | `TOKEN_SYMMETRIC_KEY`          | required |
    /// | `ACCESS_TOKEN_DURATION_MINS`   | `15`    |
    /// | `REFRESH_TOKEN_DURATION_HOURS` | `24`    |
    /// | `OPERATION_TIMEOUT_SECS`       | `10`    |
    /// | `CONCEAL_UNKNOWN_USERS`        | `false` |
    /// | `OUTBOX_POLL_INTERVAL_MS`      | `1000`  |
    /// | `OUTBOX_BATCH_SIZE`            | `50`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
            token_symmetric_key: required("TOKEN_SYMMETRIC_KEY")?,
            access_token_duration: time_delta_or(
                "ACCESS_TOKEN_DURATION_MINS",
                15,
                TimeDelta::try_minutes,
            )?,
            refresh_token_duration: time_delta_or(
                "REFRESH_TOKEN_DURATION_HOURS",
                24,
                TimeDelta::try_hours,
            )?,
            operation_timeout: Duration::from_secs(parse_or("OPERATION_TIMEOUT_SECS", 10)?),
            conceal_unknown_users: parse_or("CONCEAL_UNKNOWN_USERS", false)?,
            outbox_poll_interval: Duration::from_millis(parse_or("OUTBOX_POLL_INTERVAL_MS", 1000)?),
            outbox_batch_size: parse_or("OUTBOX_BATCH_SIZE", 50)?,
        })
    }
}

/// Read an integer count of `unit`s, rejecting values `TimeDelta` cannot hold.
fn time_delta_or(
    var: &'static str,
    default: i64,
    unit: fn(i64) -> Option<TimeDelta>,
) -> Result<TimeDelta, ConfigError> {
    to_time_delta(var, parse_or(var, default)?, unit)
}

fn to_time_delta(
    var: &'static str,
    amount: i64,
    unit: fn(i64) -> Option<TimeDelta>,
) -> Result<TimeDelta, ConfigError> {
    unit(amount).ok_or_else(|| ConfigError::Invalid {
        var,
        value: amount.to_string(),
    })
}

/// Read a required, non-empty variable.
pub fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(var)),
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => parse_value(var, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.to_string(),
    })
}
