//! ORM session factory over a connection source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{metric, DatabaseConnection, EntityTrait};
use tracing::{info, warn};

use super::dialect::{self, Dialect, DialectInfo};
use super::source::ConnectionSource;
use crate::config::db::SessionSettings;
use crate::entities::{model, model_history, model_relation};
use crate::error::DbInfraError;

/// Running totals collected when `generate_statistics` is on.
#[derive(Debug, Default)]
pub struct Statistics {
    statements: AtomicU64,
    failed_statements: AtomicU64,
    statement_nanos: AtomicU64,
    sessions_opened: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub statements: u64,
    pub failed_statements: u64,
    pub statement_time: Duration,
    pub sessions_opened: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
}

impl Statistics {
    fn record_statement(&self, elapsed: Duration, failed: bool) {
        self.statements.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_statements.fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.statement_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_rolled_back(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            statements: self.statements.load(Ordering::Relaxed),
            failed_statements: self.failed_statements.load(Ordering::Relaxed),
            statement_time: Duration::from_nanos(self.statement_nanos.load(Ordering::Relaxed)),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
        }
    }
}

/// Hands out sessions bound to the mapped modeler entities.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    conn: DatabaseConnection,
    dialect: DialectInfo,
    settings: SessionSettings,
    statistics: Option<Arc<Statistics>>,
}

/// Build the session factory for `source`.
pub async fn build_session_factory(
    source: &ConnectionSource,
    settings: &SessionSettings,
) -> Result<SessionFactory, DbInfraError> {
    let configured = Dialect::parse(&settings.dialect).ok_or_else(|| DbInfraError::Dialect {
        message: format!("unknown dialect '{}'", settings.dialect),
    })?;

    let mut conn = source.connection()?;
    let detected = dialect::detect(&conn).await?;

    if configured != detected.dialect {
        warn!(
            configured = %configured,
            detected = %detected.dialect,
            "session=dialect_mismatch using detected dialect"
        );
    }

    let statistics = settings
        .generate_statistics
        .then(|| Arc::new(Statistics::default()));

    if settings.show_sql || statistics.is_some() {
        let show_sql = settings.show_sql;
        let stats = statistics.clone();
        conn.set_metric_callback(move |m: &metric::Info<'_>| {
            if show_sql {
                info!(
                    target: "db_infra::sql",
                    elapsed_us = m.elapsed.as_micros(),
                    failed = m.failed,
                    "{}",
                    m.statement.sql
                );
            }
            if let Some(stats) = &stats {
                stats.record_statement(m.elapsed, m.failed);
            }
        });
    }

    info!("session=second_level_cache enabled=false");
    info!(
        "session_factory=ready dialect={} version={} show_sql={} statistics={}",
        detected.dialect, detected.version, settings.show_sql, settings.generate_statistics
    );

    Ok(SessionFactory {
        conn,
        dialect: detected,
        settings: settings.clone(),
        statistics,
    })
}

impl SessionFactory {
    /// A session on the shared pool.
    pub fn open_session(&self) -> DatabaseConnection {
        if let Some(stats) = &self.statistics {
            stats.session_opened();
        }
        self.conn.clone()
    }

    pub fn dialect(&self) -> &DialectInfo {
        &self.dialect
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// `None` unless statistics generation is enabled.
    pub fn statistics(&self) -> Option<StatisticsSnapshot> {
        self.statistics.as_ref().map(|s| s.snapshot())
    }

    pub(crate) fn statistics_handle(&self) -> Option<&Arc<Statistics>> {
        self.statistics.as_ref()
    }

    /// Check that every mapped table can be queried.
    pub async fn verify_mappings(&self) -> Result<(), DbInfraError> {
        check_mapped::<model::Entity>(&self.conn).await?;
        check_mapped::<model_history::Entity>(&self.conn).await?;
        check_mapped::<model_relation::Entity>(&self.conn).await?;
        info!("session=mappings_verified count=3");
        Ok(())
    }
}

async fn check_mapped<E>(conn: &DatabaseConnection) -> Result<(), DbInfraError>
where
    E: EntityTrait + Default,
{
    E::find()
        .one(conn)
        .await
        .map(|_| ())
        .map_err(|source| DbInfraError::MappingVerification {
            table: E::default().table_name().to_string(),
            source,
        })
}
