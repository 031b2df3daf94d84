#![allow(dead_code)]

use db_infra::{keys, Properties};
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement};

// Logging is auto-installed for every test binary
#[ctor::ctor]
fn init_logging() {
    db_test_support::logging::init();
}

/// Properties for a small in-memory pool.
pub fn small_pool_props() -> Properties {
    Properties::new()
        .with(keys::MIN_POOL_SIZE, "1")
        .with(keys::MAX_POOL_SIZE, "4")
}

/// A connection owned by the test, standing in for a container-managed source.
pub async fn external_db() -> DatabaseConnection {
    Database::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

pub async fn table_exists(conn: &DatabaseConnection, name: &str) -> bool {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name.into()],
    );
    let row = conn
        .query_one(stmt)
        .await
        .expect("sqlite_master query")
        .expect("one row");
    row.try_get::<i64>("", "n").expect("count column") == 1
}
