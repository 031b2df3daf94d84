use async_trait::async_trait;
use sea_orm::sea_query::{Alias, ColumnDef, Expr, OnConflict, Query, Table};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::{debug, warn};

use crate::error::MigrationError;

const LOCK_ROW_ID: i32 = 1;
const COL_ID: &str = "id";
const COL_LOCKED: &str = "locked";
const COL_LOCK_GRANTED: &str = "lock_granted";
const COL_LOCKED_BY: &str = "locked_by";

// ============================================================================
// BootstrapLock Trait and Implementations
// ============================================================================

/// Guard for a held changelog lock. Must be released explicitly; dropping
/// it leaves the row locked until `force_release` is run.
pub struct Guard {
    conn: DatabaseConnection,
    table: String,
    released: bool,
}

impl Guard {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Clear the lock row.
    pub async fn release(mut self) -> Result<(), MigrationError> {
        if self.released {
            return Ok(());
        }
        clear_lock_row(&self.conn, &self.table)
            .await
            .map_err(|source| MigrationError::Lock {
                table: self.table.clone(),
                source,
            })?;
        debug!(table = %self.table, "changelog lock released");
        self.released = true;
        Ok(())
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if !self.released {
            warn!(table = %self.table, "changelog lock guard dropped without release");
        }
    }
}

/// Trait for migration lock acquisition.
#[async_trait]
pub trait BootstrapLock {
    /// Try to acquire the lock (non-blocking).
    /// Returns Some(Guard) if acquired, None if already held elsewhere.
    async fn try_acquire(&mut self) -> Result<Option<Guard>, MigrationError>;
}

/// Row lock stored in the prefixed changelog-lock table.
///
/// The table holds a single row; a process owns the lock while it has
/// flipped `locked` from false to true. Works on every backend and across
/// processes sharing the database.
pub struct ChangelogLockTable {
    conn: DatabaseConnection,
    table: String,
    owner: String,
}

impl ChangelogLockTable {
    pub fn new(conn: DatabaseConnection, table: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
            owner: owner.into(),
        }
    }

    /// Create the table and its single row if missing.
    pub async fn ensure(&self) -> Result<(), MigrationError> {
        let backend = self.conn.get_database_backend();
        let table = Alias::new(self.table.as_str());

        let create = Table::create()
            .table(table.clone())
            .if_not_exists()
            .col(
                ColumnDef::new(Alias::new(COL_ID))
                    .integer()
                    .not_null()
                    .primary_key(),
            )
            .col(ColumnDef::new(Alias::new(COL_LOCKED)).boolean().not_null())
            .col(ColumnDef::new(Alias::new(COL_LOCK_GRANTED)).big_integer().null())
            .col(ColumnDef::new(Alias::new(COL_LOCKED_BY)).string_len(255).null())
            .to_owned();

        let seed = Query::insert()
            .into_table(table)
            .columns([Alias::new(COL_ID), Alias::new(COL_LOCKED)])
            .values_panic([LOCK_ROW_ID.into(), false.into()])
            .on_conflict(
                OnConflict::column(Alias::new(COL_ID))
                    .do_nothing()
                    .to_owned(),
            )
            .to_owned();

        let prepare = async {
            self.conn.execute(backend.build(&create)).await?;
            self.conn.execute(backend.build(&seed)).await?;
            Ok::<_, DbErr>(())
        };
        prepare.await.map_err(|source| MigrationError::LockTable {
            table: self.table.clone(),
            source,
        })
    }

    /// Who holds the lock, if anyone.
    pub async fn holder(&self) -> Result<Option<String>, MigrationError> {
        let backend = self.conn.get_database_backend();
        let select = Query::select()
            .columns([Alias::new(COL_LOCKED), Alias::new(COL_LOCKED_BY)])
            .from(Alias::new(self.table.as_str()))
            .and_where(Expr::col(Alias::new(COL_ID)).eq(LOCK_ROW_ID))
            .to_owned();

        let row = self
            .conn
            .query_one(backend.build(&select))
            .await
            .map_err(|source| self.lock_error(source))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let locked: bool = row
            .try_get("", COL_LOCKED)
            .map_err(|source| self.lock_error(source))?;
        if !locked {
            return Ok(None);
        }
        let by: Option<String> = row
            .try_get("", COL_LOCKED_BY)
            .map_err(|source| self.lock_error(source))?;
        Ok(Some(by.unwrap_or_else(|| "<unknown>".to_string())))
    }

    fn lock_error(&self, source: DbErr) -> MigrationError {
        MigrationError::Lock {
            table: self.table.clone(),
            source,
        }
    }
}

#[async_trait]
impl BootstrapLock for ChangelogLockTable {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, MigrationError> {
        let backend = self.conn.get_database_backend();
        let granted = time::OffsetDateTime::now_utc().unix_timestamp();

        let update = Query::update()
            .table(Alias::new(self.table.as_str()))
            .values([
                (Alias::new(COL_LOCKED), Expr::value(true)),
                (Alias::new(COL_LOCK_GRANTED), Expr::value(granted)),
                (Alias::new(COL_LOCKED_BY), Expr::value(self.owner.clone())),
            ])
            .and_where(Expr::col(Alias::new(COL_ID)).eq(LOCK_ROW_ID))
            .and_where(Expr::col(Alias::new(COL_LOCKED)).eq(false))
            .to_owned();

        let result = self
            .conn
            .execute(backend.build(&update))
            .await
            .map_err(|source| self.lock_error(source))?;

        if result.rows_affected() == 0 {
            debug!(table = %self.table, "changelog lock contended");
            return Ok(None);
        }

        debug!(table = %self.table, owner = %self.owner, "changelog lock acquired");
        Ok(Some(Guard {
            conn: self.conn.clone(),
            table: self.table.clone(),
            released: false,
        }))
    }
}

async fn clear_lock_row(conn: &DatabaseConnection, table: &str) -> Result<u64, DbErr> {
    let backend = conn.get_database_backend();
    let update = Query::update()
        .table(Alias::new(table))
        .values([
            (Alias::new(COL_LOCKED), Expr::value(false)),
            (Alias::new(COL_LOCK_GRANTED), Expr::value(Option::<i64>::None)),
            (Alias::new(COL_LOCKED_BY), Expr::value(Option::<String>::None)),
        ])
        .and_where(Expr::col(Alias::new(COL_ID)).eq(LOCK_ROW_ID))
        .and_where(Expr::col(Alias::new(COL_LOCKED)).eq(true))
        .to_owned();
    Ok(conn.execute(backend.build(&update)).await?.rows_affected())
}

/// Clear a lock left behind by a crashed process. Returns whether a held
/// lock was actually cleared.
pub async fn force_release(conn: &DatabaseConnection, table: &str) -> Result<bool, MigrationError> {
    let cleared = clear_lock_row(conn, table)
        .await
        .map_err(|source| MigrationError::Lock {
            table: table.to_string(),
            source,
        })?;
    if cleared > 0 {
        warn!(table = %table, "changelog lock forcibly released");
    }
    Ok(cleared > 0)
}
