use std::fmt;
use std::time::Duration;

use migration::{MigrationCommand, CHANGELOG};

use super::properties::{keys, Properties};
use crate::error::DbInfraError;

pub const DEFAULT_DRIVER: &str = "sqlite";
/// Anonymous in-memory database private to the pool; it is gone once the
/// pool closes its last connection.
pub const DEFAULT_URL: &str = "sqlite::memory:";
pub const DEFAULT_USERNAME: &str = "sa";
pub const DEFAULT_MIN_POOL_SIZE: u32 = 10;
pub const DEFAULT_MAX_POOL_SIZE: u32 = 100;
pub const DEFAULT_ACQUIRE_INCREMENT: u32 = 5;
pub const DEFAULT_MAX_IDLE_TIME_SECS: u64 = 1800;
pub const DEFAULT_MAX_IDLE_TIME_EXCESS_SECS: u64 = 1800;
pub const DEFAULT_DIALECT: &str = "sqlite";
pub const DEFAULT_MIGRATION_CONTEXT: &str = "activiti";
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;
pub const MIGRATION_BODY_TIMEOUT_MS: u64 = 120_000;

/// Prefix applied to external resource names when `resourceRef` is set.
pub const RESOURCE_REF_PREFIX: &str = "java:comp/env/";

/// Database drivers the pool builder can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Sqlite,
    Postgres,
}

impl DriverKind {
    /// Resolve a driver identifier; `None` means the driver cannot be loaded.
    pub fn parse(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }

    pub fn engine(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgresql",
        }
    }
}

/// Resolved connection and pool-sizing parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub driver: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    pub acquire_increment: u32,
    pub preferred_test_query: Option<String>,
    pub test_connection_on_checkin: bool,
    pub test_connection_on_checkout: bool,
    /// Seconds a pooled connection may sit idle before it is discarded (0 = never).
    pub max_idle_time_secs: u64,
    /// Seconds connections above the minimum may sit idle (0 = never).
    pub max_idle_time_excess_connections_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            url: DEFAULT_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            min_pool_size: DEFAULT_MIN_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            acquire_increment: DEFAULT_ACQUIRE_INCREMENT,
            preferred_test_query: None,
            test_connection_on_checkin: true,
            test_connection_on_checkout: true,
            max_idle_time_secs: DEFAULT_MAX_IDLE_TIME_SECS,
            max_idle_time_excess_connections_secs: DEFAULT_MAX_IDLE_TIME_EXCESS_SECS,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("driver", &self.driver)
            .field("url", &crate::infra::db::core::sanitize_db_url(&self.url))
            .field("username", &self.username)
            .field("password", &"***")
            .field("min_pool_size", &self.min_pool_size)
            .field("max_pool_size", &self.max_pool_size)
            .field("acquire_increment", &self.acquire_increment)
            .field("preferred_test_query", &self.preferred_test_query)
            .field("test_connection_on_checkin", &self.test_connection_on_checkin)
            .field("test_connection_on_checkout", &self.test_connection_on_checkout)
            .field("max_idle_time_secs", &self.max_idle_time_secs)
            .field(
                "max_idle_time_excess_connections_secs",
                &self.max_idle_time_excess_connections_secs,
            )
            .finish()
    }
}

impl PoolConfig {
    /// Apply each property over its default. Does not validate.
    pub fn from_properties(props: &Properties) -> Self {
        let defaults = Self::default();
        Self {
            driver: props.get_or(keys::DRIVER, DEFAULT_DRIVER).to_string(),
            url: props.get_or(keys::URL, DEFAULT_URL).to_string(),
            username: props.get_or(keys::USERNAME, DEFAULT_USERNAME).to_string(),
            password: props.get_or(keys::PASSWORD, "").to_string(),
            min_pool_size: props
                .get_parsed(keys::MIN_POOL_SIZE)
                .unwrap_or(defaults.min_pool_size),
            max_pool_size: props
                .get_parsed(keys::MAX_POOL_SIZE)
                .unwrap_or(defaults.max_pool_size),
            acquire_increment: props
                .get_parsed(keys::ACQUIRE_INCREMENT)
                .unwrap_or(defaults.acquire_increment),
            preferred_test_query: props
                .get_non_empty(keys::PREFERRED_TEST_QUERY)
                .map(str::to_string),
            test_connection_on_checkin: props
                .get_bool(keys::TEST_ON_CHECKIN)
                .unwrap_or(defaults.test_connection_on_checkin),
            test_connection_on_checkout: props
                .get_bool(keys::TEST_ON_CHECKOUT)
                .unwrap_or(defaults.test_connection_on_checkout),
            max_idle_time_secs: props
                .get_parsed(keys::MAX_IDLE_TIME)
                .unwrap_or(defaults.max_idle_time_secs),
            max_idle_time_excess_connections_secs: props
                .get_parsed(keys::MAX_IDLE_TIME_EXCESS)
                .unwrap_or(defaults.max_idle_time_excess_connections_secs),
        }
    }

    pub fn validate(&self) -> Result<(), DbInfraError> {
        if self.min_pool_size > self.max_pool_size {
            return Err(DbInfraError::InvalidPoolRange {
                min: self.min_pool_size,
                max: self.max_pool_size,
            });
        }
        if self.max_pool_size == 0 {
            return Err(DbInfraError::config("max pool size must be at least 1"));
        }
        if self.acquire_increment == 0 {
            return Err(DbInfraError::config("acquire increment must be at least 1"));
        }
        Ok(())
    }

    pub fn max_idle_time(&self) -> Option<Duration> {
        (self.max_idle_time_secs > 0).then(|| Duration::from_secs(self.max_idle_time_secs))
    }

    pub fn max_idle_time_excess_connections(&self) -> Option<Duration> {
        (self.max_idle_time_excess_connections_secs > 0)
            .then(|| Duration::from_secs(self.max_idle_time_excess_connections_secs))
    }
}

/// A connection source registered under a name in a resource directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSource {
    pub name: String,
    pub resource_ref: bool,
}

impl ExternalSource {
    /// Names to look up, in order.
    ///
    /// With `resource_ref`, a bare name is first tried under
    /// `java:comp/env/` and then as given.
    pub fn candidate_names(&self) -> Vec<String> {
        let bare = !self.name.starts_with(RESOURCE_REF_PREFIX) && !self.name.contains(':');
        if self.resource_ref && bare {
            vec![
                format!("{RESOURCE_REF_PREFIX}{}", self.name),
                self.name.clone(),
            ]
        } else {
            vec![self.name.clone()]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceSettings {
    External(ExternalSource),
    Pooled(PoolConfig),
}

impl DataSourceSettings {
    /// An external name short-circuits the pool: none of the pool keys are
    /// read or validated in that case.
    pub fn from_properties(props: &Properties) -> Result<Self, DbInfraError> {
        if let Some(name) = props.get_non_empty(keys::JNDI_NAME) {
            return Ok(Self::External(ExternalSource {
                name: name.to_string(),
                resource_ref: props.get_bool(keys::JNDI_RESOURCE_REF).unwrap_or(true),
            }));
        }

        let pool = PoolConfig::from_properties(props);
        pool.validate()?;
        Ok(Self::Pooled(pool))
    }
}

/// ORM session factory settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub generate_statistics: bool,
    pub show_sql: bool,
    pub dialect: String,
    /// Always off; sessions never share an entity cache.
    pub second_level_cache: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            generate_statistics: false,
            show_sql: false,
            dialect: DEFAULT_DIALECT.to_string(),
            second_level_cache: false,
        }
    }
}

impl SessionSettings {
    pub fn from_properties(props: &Properties) -> Self {
        Self {
            generate_statistics: props.get_bool(keys::GENERATE_STATISTICS).unwrap_or(false),
            show_sql: props.get_bool(keys::SHOW_SQL).unwrap_or(false),
            dialect: props.get_or(keys::DIALECT, DEFAULT_DIALECT).to_string(),
            second_level_cache: false,
        }
    }
}

/// What the migration runner applies and how long it waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub changelog: &'static str,
    pub context: String,
    pub command: MigrationCommand,
    pub lock_timeout: Duration,
    pub body_timeout: Duration,
}

impl Default for MigrationPlan {
    fn default() -> Self {
        Self {
            changelog: CHANGELOG,
            context: DEFAULT_MIGRATION_CONTEXT.to_string(),
            command: MigrationCommand::Up,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            body_timeout: Duration::from_millis(MIGRATION_BODY_TIMEOUT_MS),
        }
    }
}

impl MigrationPlan {
    pub fn from_properties(props: &Properties) -> Self {
        let lock_timeout_ms = props
            .get_parsed(keys::LOCK_TIMEOUT_MS)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT_MS);
        Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, command: MigrationCommand) -> Self {
        self.command = command;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Everything the bootstrap needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    pub datasource: DataSourceSettings,
    pub session: SessionSettings,
    pub migration: MigrationPlan,
}

impl PersistenceSettings {
    pub fn from_properties(props: &Properties) -> Result<Self, DbInfraError> {
        Ok(Self {
            datasource: DataSourceSettings::from_properties(props)?,
            session: SessionSettings::from_properties(props),
            migration: MigrationPlan::from_properties(props),
        })
    }
}
