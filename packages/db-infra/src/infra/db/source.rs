//! Connection source construction: a lazily connecting sqlx pool handed to
//! SeaORM, or an externally managed connection resolved by name.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, SqlxPostgresConnector, SqlxSqliteConnector};
use sqlx::pool::PoolOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Executor};
use tracing::{debug, error, info};

use super::core::sanitize_db_url;
use super::registry::ResourceDirectory;
use crate::config::db::{DataSourceSettings, DriverKind, ExternalSource, PoolConfig};
use crate::error::DbInfraError;

/// The connection source every other persistence component is built on.
#[derive(Debug, Clone)]
pub enum ConnectionSource {
    /// Pool built and owned by this process.
    Pooled {
        driver: DriverKind,
        conn: DatabaseConnection,
    },
    /// Connection resolved from a resource directory; not owned.
    External {
        name: String,
        conn: DatabaseConnection,
    },
    /// The driver could not be loaded. Every use fails.
    Unavailable { reason: String },
}

impl ConnectionSource {
    /// A handle onto the source. Cheap: the handle shares the pool.
    pub fn connection(&self) -> Result<DatabaseConnection, DbInfraError> {
        match self {
            Self::Pooled { conn, .. } | Self::External { conn, .. } => Ok(conn.clone()),
            Self::Unavailable { reason } => Err(DbInfraError::SourceUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pooled { .. } => "pooled",
            Self::External { .. } => "external",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    /// Release the pool. External sources belong to their directory and
    /// are left open.
    pub async fn close(self) -> Result<(), DbInfraError> {
        match self {
            Self::Pooled { driver, conn } => {
                conn.close().await?;
                info!("pool=closed engine={}", driver.engine());
            }
            Self::External { name, .. } => {
                debug!(name = %name, "pool=external left_open=true");
            }
            Self::Unavailable { .. } => {}
        }
        Ok(())
    }
}

/// Build the connection source described by `settings`.
///
/// A named external source is returned unmodified. Otherwise a pool is
/// built; an unknown driver yields [`ConnectionSource::Unavailable`] rather
/// than an error.
pub async fn build_connection_source(
    settings: &DataSourceSettings,
    directory: &dyn ResourceDirectory,
) -> Result<ConnectionSource, DbInfraError> {
    info!("Configuring connection source");

    match settings {
        DataSourceSettings::External(external) => resolve_external(external, directory),
        DataSourceSettings::Pooled(pool_cfg) => build_pooled_source(pool_cfg).await,
    }
}

pub fn resolve_external(
    external: &ExternalSource,
    directory: &dyn ResourceDirectory,
) -> Result<ConnectionSource, DbInfraError> {
    info!(name = %external.name, "Using external connection source");

    let candidates = external.candidate_names();
    for name in &candidates {
        if let Some(conn) = directory.lookup(name) {
            debug!(name = %name, resource_ref = external.resource_ref, "resource=resolved");
            return Ok(ConnectionSource::External {
                name: name.clone(),
                conn,
            });
        }
    }

    Err(DbInfraError::ResourceLookup {
        name: external.name.clone(),
        tried: candidates,
    })
}

/// Build a pool from `pool_cfg` without opening any connection yet.
pub async fn build_pooled_source(pool_cfg: &PoolConfig) -> Result<ConnectionSource, DbInfraError> {
    info!("Configuring connection pool with following properties (omitted password for security)");
    info!("pool driver: {}", pool_cfg.driver);
    info!("pool url: {}", sanitize_db_url(&pool_cfg.url));
    info!("pool user name: {}", pool_cfg.username);
    info!(
        "Min pool size | Max pool size | acquire increment : {} | {} | {}",
        pool_cfg.min_pool_size, pool_cfg.max_pool_size, pool_cfg.acquire_increment
    );

    let Some(driver) = DriverKind::parse(&pool_cfg.driver) else {
        error!(driver = %pool_cfg.driver, "Could not load database driver");
        return Ok(ConnectionSource::Unavailable {
            reason: format!("unknown database driver '{}'", pool_cfg.driver),
        });
    };

    let conn = match driver {
        DriverKind::Sqlite => {
            let connect_opts = SqliteConnectOptions::from_str(&pool_cfg.url)
                .map_err(|e| DbInfraError::config(format!("invalid SQLite connection url: {e}")))?
                .create_if_missing(true);

            if !pool_cfg.password.is_empty() {
                debug!("db=sqlite credentials ignored");
            }

            let pool = pool_options::<sqlx::Sqlite>(pool_cfg).connect_lazy_with(connect_opts);
            SqlxSqliteConnector::from_sqlx_sqlite_pool(pool)
        }
        DriverKind::Postgres => {
            let mut connect_opts = PgConnectOptions::from_str(&pool_cfg.url).map_err(|e| {
                DbInfraError::config(format!("invalid Postgres connection url: {e}"))
            })?;
            if !pool_cfg.username.is_empty() {
                connect_opts = connect_opts.username(&pool_cfg.username);
            }
            if !pool_cfg.password.is_empty() {
                connect_opts = connect_opts.password(&pool_cfg.password);
            }

            let pool = pool_options::<sqlx::Postgres>(pool_cfg).connect_lazy_with(connect_opts);
            SqlxPostgresConnector::from_sqlx_postgres_pool(pool)
        }
    };

    info!(
        "pool=create engine={} min={} max={} max_idle_s={} max_idle_excess_s={} test_checkout={} test_checkin={}",
        driver.engine(),
        pool_cfg.min_pool_size,
        pool_cfg.max_pool_size,
        pool_cfg.max_idle_time_secs,
        pool_cfg.max_idle_time_excess_connections_secs,
        pool_cfg.test_connection_on_checkout,
        pool_cfg.test_connection_on_checkin
    );

    Ok(ConnectionSource::Pooled { driver, conn })
}

/// Validation run against a pooled connection on checkout or checkin.
#[derive(Debug, Clone)]
enum ConnectionTest {
    Disabled,
    Ping,
    Query(Arc<str>),
}

impl ConnectionTest {
    fn new(enabled: bool, preferred_query: Option<&str>) -> Self {
        match (enabled, preferred_query) {
            (false, _) => Self::Disabled,
            (true, Some(query)) => Self::Query(Arc::from(query)),
            (true, None) => Self::Ping,
        }
    }

    /// `false` means the connection must be discarded.
    fn passes<'c, DB>(&self, conn: &'c mut DB::Connection) -> BoxFuture<'c, bool>
    where
        DB: sqlx::Database,
        for<'e> &'e mut DB::Connection: Executor<'e, Database = DB>,
    {
        let test = self.clone();
        Box::pin(async move {
            let outcome = match &test {
                ConnectionTest::Disabled => Ok(()),
                ConnectionTest::Ping => conn.ping().await,
                ConnectionTest::Query(sql) => conn.execute(&**sql).await.map(|_| ()),
            };
            match outcome {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "pool=connection_test_failed discarding");
                    false
                }
            }
        })
    }
}

fn pool_options<DB>(pool_cfg: &PoolConfig) -> PoolOptions<DB>
where
    DB: sqlx::Database,
    for<'e> &'e mut DB::Connection: Executor<'e, Database = DB>,
{
    let checkout = ConnectionTest::new(
        pool_cfg.test_connection_on_checkout,
        pool_cfg.preferred_test_query.as_deref(),
    );
    let checkin = ConnectionTest::new(
        pool_cfg.test_connection_on_checkin,
        pool_cfg.preferred_test_query.as_deref(),
    );
    let max_idle_time: Option<Duration> = pool_cfg.max_idle_time();

    PoolOptions::<DB>::new()
        .min_connections(pool_cfg.min_pool_size)
        .max_connections(pool_cfg.max_pool_size)
        // sqlx only reaps idle connections above min_connections
        .idle_timeout(pool_cfg.max_idle_time_excess_connections())
        .max_lifetime(None::<Duration>)
        .test_before_acquire(false)
        .before_acquire(move |conn, meta| {
            let test = checkout.clone();
            Box::pin(async move {
                if let Some(limit) = max_idle_time.filter(|limit| meta.idle_for > *limit) {
                    trace_idle_eviction(meta.idle_for, limit);
                    return Ok::<_, sqlx::Error>(false);
                }
                Ok(test.passes::<DB>(conn).await)
            })
        })
        .after_release(move |conn, _meta| {
            let test = checkin.clone();
            Box::pin(async move { Ok::<_, sqlx::Error>(test.passes::<DB>(conn).await) })
        })
}

fn trace_idle_eviction(idle_for: Duration, limit: Duration) {
    debug!(
        idle_ms = idle_for.as_millis(),
        limit_ms = limit.as_millis(),
        "pool=idle_eviction"
    );
}
