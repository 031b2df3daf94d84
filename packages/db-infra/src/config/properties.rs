//! Flat key/value configuration source.
//!
//! Values are collected once at startup (explicit pairs, environment) and
//! then handed by value to the builders; nothing reads the environment after
//! that point.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::DbInfraError;
use crate::infra::db::core::sanitize_db_url;

/// Property keys understood by the persistence bootstrap.
pub mod keys {
    pub const JNDI_NAME: &str = "datasource.jndi.name";
    pub const JNDI_RESOURCE_REF: &str = "datasource.jndi.resourceRef";
    pub const DRIVER: &str = "datasource.driver";
    pub const URL: &str = "datasource.url";
    pub const USERNAME: &str = "datasource.username";
    pub const PASSWORD: &str = "datasource.password";
    pub const MIN_POOL_SIZE: &str = "datasource.min-pool-size";
    pub const MAX_POOL_SIZE: &str = "datasource.max-pool-size";
    pub const ACQUIRE_INCREMENT: &str = "datasource.acquire-increment";
    pub const PREFERRED_TEST_QUERY: &str = "datasource.preferred-test-query";
    pub const TEST_ON_CHECKIN: &str = "datasource.test-connection-on-checkin";
    pub const TEST_ON_CHECKOUT: &str = "datasource.test-connection-on-checkout";
    pub const MAX_IDLE_TIME: &str = "datasource.max-idle-time";
    pub const MAX_IDLE_TIME_EXCESS: &str = "datasource.max-idle-time-excess-connections";
    pub const GENERATE_STATISTICS: &str = "hibernate.generate_statistics";
    pub const SHOW_SQL: &str = "hibernate.show_sql";
    pub const DIALECT: &str = "hibernate.dialect";
    pub const LOCK_TIMEOUT_MS: &str = "migration.lock-timeout-ms";

    pub const ALL: &[&str] = &[
        JNDI_NAME,
        JNDI_RESOURCE_REF,
        DRIVER,
        URL,
        USERNAME,
        PASSWORD,
        MIN_POOL_SIZE,
        MAX_POOL_SIZE,
        ACQUIRE_INCREMENT,
        PREFERRED_TEST_QUERY,
        TEST_ON_CHECKIN,
        TEST_ON_CHECKOUT,
        MAX_IDLE_TIME,
        MAX_IDLE_TIME_EXCESS,
        GENERATE_STATISTICS,
        SHOW_SQL,
        DIALECT,
        LOCK_TIMEOUT_MS,
    ];

    /// Keys whose values must never be printed or logged.
    pub fn is_sensitive(key: &str) -> bool {
        key == PASSWORD
    }
}

/// Environment-variable form of a property key
/// (`datasource.min-pool-size` -> `DATASOURCE_MIN_POOL_SIZE`).
pub fn relaxed_env_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// Split a `key=value` assignment as given on the command line.
pub fn parse_assignment(raw: &str) -> Result<(String, String), DbInfraError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(DbInfraError::config(format!(
            "expected key=value, got '{raw}'"
        ))),
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read every known key from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read every known key through `lookup`, trying the relaxed
    /// (upper-case, underscore) name before the literal key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = BTreeMap::new();
        for key in keys::ALL {
            let found = lookup(&relaxed_env_name(key)).or_else(|| lookup(key));
            if let Some(value) = found {
                values.insert((*key).to_string(), value);
            }
        }
        Self { values }
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(mut self, other: Properties) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value of `key`, treating a blank value as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parsed value of `key`. Unparseable values are logged and treated as
    /// absent so the caller's default applies.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get_non_empty(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key = key, "config=invalid_value using default");
                None
            }
        }
    }

    /// Boolean value of `key`; accepts true/false, yes/no, on/off and 1/0.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        let raw = self.get_non_empty(key)?;
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => {
                warn!(key = key, "config=invalid_value using default");
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if keys::is_sensitive(key) {
                map.entry(key, &"***");
            } else if key == keys::URL {
                map.entry(key, &sanitize_db_url(value));
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}
