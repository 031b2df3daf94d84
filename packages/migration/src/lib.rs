pub use sea_orm::{ConnectionTrait, DatabaseConnection};
pub use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

mod bookkeeping;
mod m20240315_000001_modeler_init; // keep filename + module name in sync

pub use bookkeeping::{
    changelog_lock_table_name, changelog_table_name, BookkeepingTables, BOOKKEEPING_PREFIX,
    CHANGELOG_LOCK_TABLE, CHANGELOG_TABLE,
};

/// Name of the changelog shipped with this crate.
pub const CHANGELOG: &str = "modeler-db-changelog";

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240315_000001_modeler_init::Migration)]
    }

    fn migration_table_name() -> DynIden {
        Alias::new(changelog_table_name()).into_iden()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    Up,
    Down,
    Fresh,
    Reset,
    Refresh,
    Status,
}

impl MigrationCommand {
    /// Parse the lowercase command name used on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "fresh" => Some(Self::Fresh),
            "reset" => Some(Self::Reset),
            "refresh" => Some(Self::Refresh),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Run one migrator command against `db`, logging the changelog state
/// before and after.
///
/// `Fresh` is a reset followed by a full `up`: only tables created by this
/// changelog are dropped, never those of other schemas sharing the
/// database.
pub async fn migrate(db: &DatabaseConnection, command: MigrationCommand) -> Result<(), DbErr> {
    let before = changelog_state(db).await?;
    tracing::info!(
        changelog = CHANGELOG,
        cmd = ?command,
        backend = ?db.get_database_backend(),
        database = %before.database,
        changelog_table = %before.tables.changelog,
        lock_table = %before.tables.changelog_lock,
        "changelog=before defined={} applied={} pending={}",
        before.defined,
        before.applied,
        before.pending.len()
    );

    let result = match command {
        MigrationCommand::Up => Migrator::up(db, None).await,
        MigrationCommand::Down => Migrator::down(db, None).await,
        MigrationCommand::Fresh => match Migrator::reset(db).await {
            Ok(()) => Migrator::up(db, None).await,
            Err(e) => Err(e),
        },
        MigrationCommand::Reset => Migrator::reset(db).await,
        MigrationCommand::Refresh => Migrator::refresh(db).await,
        MigrationCommand::Status => Migrator::status(db).await,
    };

    if let Err(e) = result {
        tracing::error!(changelog = CHANGELOG, cmd = ?command, error = %e, "changelog=failed");
        return Err(e);
    }

    if !matches!(command, MigrationCommand::Status) {
        let after = changelog_state(db).await?;
        tracing::info!(
            changelog = CHANGELOG,
            cmd = ?command,
            "changelog=after applied={} pending={}",
            after.applied,
            after.pending.len()
        );
    }
    Ok(())
}

/// Where the modeler changelog stands on one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogState {
    /// Database (Postgres) or file (SQLite) the connection points at.
    pub database: String,
    pub tables: BookkeepingTables,
    pub defined: usize,
    pub applied: usize,
    /// Migrations defined by this crate but not yet recorded as applied.
    pub pending: Vec<String>,
}

/// Read the changelog state of `db`. Installs the prefixed changelog
/// table if it is missing.
pub async fn changelog_state(db: &DatabaseConnection) -> Result<ChangelogState, DbErr> {
    let backend = db.get_database_backend();
    let applied = Migrator::get_applied_migrations(db).await?;
    let pending = Migrator::get_pending_migrations(db)
        .await?
        .iter()
        .map(|m| m.name().to_string())
        .collect();

    Ok(ChangelogState {
        database: database_name(db).await?,
        tables: BookkeepingTables::for_backend(backend),
        defined: Migrator::migrations().len(),
        applied: applied.len(),
        pending,
    })
}

async fn database_name(db: &DatabaseConnection) -> Result<String, DbErr> {
    let backend = db.get_database_backend();
    let (sql, column) = match backend {
        sea_orm::DatabaseBackend::Postgres => ("SELECT current_database() AS name", "name"),
        sea_orm::DatabaseBackend::Sqlite => (
            "SELECT file FROM pragma_database_list WHERE name = 'main'",
            "file",
        ),
        sea_orm::DatabaseBackend::MySql => return Ok("<unsupported>".to_string()),
    };

    let name = match db.query_one(Statement::from_string(backend, sql)).await? {
        Some(row) => row.try_get::<String>("", column)?,
        None => String::new(),
    };
    Ok(if name.is_empty() {
        ":memory:".to_string()
    } else {
        name
    })
}

/// Count the migrations recorded in the prefixed changelog table,
/// creating the table first if needed.
pub async fn count_applied_migrations(db: &DatabaseConnection) -> Result<usize, DbErr> {
    Ok(Migrator::get_applied_migrations(db).await?.len())
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;

    use super::*;

    async fn table_exists(db: &DatabaseConnection, name: &str) -> bool {
        let stmt = Statement::from_sql_and_values(
            sea_orm::DatabaseBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name.into()],
        );
        let row = db
            .query_one(stmt)
            .await
            .expect("sqlite_master query")
            .expect("one row");
        row.try_get::<i64>("", "n").expect("count column") == 1
    }

    async fn memory_db() -> DatabaseConnection {
        Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn up_records_into_prefixed_changelog() {
        let db = memory_db().await;

        migrate(&db, MigrationCommand::Up).await.expect("up");

        assert!(table_exists(&db, "ACT_DE_seaql_migrations").await);
        assert!(!table_exists(&db, "seaql_migrations").await);
        assert!(table_exists(&db, "ACT_DE_MODEL").await);
        assert_eq!(
            count_applied_migrations(&db).await.expect("count"),
            Migrator::migrations().len()
        );

        let state = changelog_state(&db).await.expect("state");
        assert_eq!(state.applied, state.defined);
        assert!(state.pending.is_empty());
        assert_eq!(state.tables.changelog, "ACT_DE_seaql_migrations");
    }

    #[tokio::test]
    async fn fresh_db_lists_every_migration_as_pending() {
        let db = memory_db().await;

        assert_eq!(count_applied_migrations(&db).await.expect("count"), 0);
        let state = changelog_state(&db).await.expect("state");
        assert_eq!(state.applied, 0);
        assert_eq!(
            state.pending,
            vec!["m20240315_000001_modeler_init".to_string()]
        );
    }

    #[tokio::test]
    async fn fresh_leaves_other_schemas_alone() {
        let db = memory_db().await;
        db.execute_unprepared("CREATE TABLE ACT_RU_TASK (id INTEGER PRIMARY KEY)")
            .await
            .expect("co-tenant table");
        migrate(&db, MigrationCommand::Up).await.expect("up");

        migrate(&db, MigrationCommand::Fresh).await.expect("fresh");

        assert!(table_exists(&db, "ACT_RU_TASK").await);
        assert!(table_exists(&db, "ACT_DE_MODEL").await);
        assert_eq!(
            count_applied_migrations(&db).await.expect("count"),
            Migrator::migrations().len()
        );
    }

    #[tokio::test]
    async fn count_reports_real_failures() {
        let db = memory_db().await;
        migrate(&db, MigrationCommand::Up).await.expect("up");
        db.execute_unprepared("DROP TABLE ACT_DE_seaql_migrations")
            .await
            .expect("drop");
        db.execute_unprepared("CREATE VIEW ACT_DE_seaql_migrations AS SELECT 1 AS x")
            .await
            .expect("shadowing view");

        assert!(count_applied_migrations(&db).await.is_err());
    }

    #[test]
    fn command_names_parse() {
        assert_eq!(MigrationCommand::parse("up"), Some(MigrationCommand::Up));
        assert_eq!(MigrationCommand::parse("status"), Some(MigrationCommand::Status));
        assert_eq!(MigrationCommand::parse("sideways"), None);
    }
}
