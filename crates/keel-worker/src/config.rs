//! Worker configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use keel_core::config::{DEFAULT_SNAPSHOT_INTERVAL, DEFAULT_SUBSCRIPTION_CAPACITY};

use crate::error::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_SAGA_STEP_TIMEOUT_MS: u64 = 30_000;

/// Settings for one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// PostgreSQL connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Pool size (`DATABASE_MAX_CONNECTIONS`).
    pub database_max_connections: u32,
    /// Events between snapshots, `0` disables them (`SNAPSHOT_INTERVAL`).
    pub snapshot_interval: u64,
    /// Live subscription buffer per subscriber (`SUBSCRIPTION_CAPACITY`).
    pub subscription_capacity: usize,
    /// Deadline for each saga step (`SAGA_STEP_TIMEOUT_MS`).
    pub saga_step_timeout: Duration,
}

impl WorkerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is unset or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".into())
            })?;

        Ok(Self {
            database_url,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            snapshot_interval: parse_or(&lookup, "SNAPSHOT_INTERVAL", DEFAULT_SNAPSHOT_INTERVAL)?,
            subscription_capacity: parse_or(
                &lookup,
                "SUBSCRIPTION_CAPACITY",
                DEFAULT_SUBSCRIPTION_CAPACITY,
            )?,
            saga_step_timeout: Duration::from_millis(parse_or(
                &lookup,
                "SAGA_STEP_TIMEOUT_MS",
                DEFAULT_SAGA_STEP_TIMEOUT_MS,
            )?),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config =
            WorkerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/keel")]))
                .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/keel");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.snapshot_interval, 50);
        assert_eq!(config.subscription_capacity, 1024);
        assert_eq!(config.saga_step_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/keel"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("SNAPSHOT_INTERVAL", "0"),
            ("SUBSCRIPTION_CAPACITY", "16"),
            ("SAGA_STEP_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.database_max_connections, 4);
        assert_eq!(config.snapshot_interval, 0);
        assert_eq!(config.subscription_capacity, 16);
        assert_eq!(config.saga_step_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = WorkerConfig::from_lookup(lookup(&[]));

        assert!(matches!(result, Err(AppError::Config(message)) if message.contains("DATABASE_URL")));
    }

    #[test]
    fn test_unparsable_number_names_the_variable() {
        let result = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/keel"),
            ("SNAPSHOT_INTERVAL", "often"),
        ]));

        assert!(matches!(result, Err(AppError::Config(message)) if message.contains("SNAPSHOT_INTERVAL")));
    }
}
