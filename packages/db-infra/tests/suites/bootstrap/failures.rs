use std::error::Error as _;

use db_infra::infra::db::{BootstrapLock, ChangelogLockTable};
use db_infra::{
    build_connection_source, build_session_factory, keys, DbInfraError, MigrationError,
    PersistenceContext, PersistenceSettings, Properties, ResourceRegistry, SessionSettings,
};

use crate::support::{external_db, small_pool_props};

#[tokio::test]
async fn inverted_pool_range_is_rejected() {
    let props = Properties::new()
        .with(keys::MIN_POOL_SIZE, "20")
        .with(keys::MAX_POOL_SIZE, "10");

    let err = PersistenceSettings::from_properties(&props).expect_err("min > max");
    assert!(matches!(
        err,
        DbInfraError::InvalidPoolRange { min: 20, max: 10 }
    ));
}

#[tokio::test]
async fn unknown_driver_leaves_source_unusable() -> Result<(), DbInfraError> {
    let props = small_pool_props().with(keys::DRIVER, "oracle");
    let settings = PersistenceSettings::from_properties(&props)?;

    let source = build_connection_source(&settings.datasource, &ResourceRegistry::new()).await?;
    assert!(!source.is_usable());

    let err = build_session_factory(&source, &SessionSettings::default())
        .await
        .expect_err("unusable source");
    assert!(matches!(err, DbInfraError::SourceUnavailable { .. }));

    let err = PersistenceContext::bootstrap(settings, &ResourceRegistry::new())
        .await
        .expect_err("bootstrap on unusable source");
    assert!(matches!(
        err,
        DbInfraError::Migration {
            source: MigrationError::SourceUnavailable { .. },
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn held_changelog_lock_fails_with_cause() -> Result<(), DbInfraError> {
    let registry = ResourceRegistry::new();
    let conn = external_db().await;
    registry.bind("jdbc/modelerDS", conn.clone());

    let mut other_node =
        ChangelogLockTable::new(conn, "ACT_DE_seaql_migrations_lock", "other-node");
    other_node.ensure().await.map_err(|source| DbInfraError::Migration {
        changelog: "test",
        source,
    })?;
    let _held = other_node
        .try_acquire()
        .await
        .map_err(|source| DbInfraError::Migration {
            changelog: "test",
            source,
        })?
        .expect("lock free");

    let props = Properties::new()
        .with(keys::JNDI_NAME, "jdbc/modelerDS")
        .with(keys::LOCK_TIMEOUT_MS, "50");
    let err = PersistenceContext::bootstrap(PersistenceSettings::from_properties(&props)?, &registry)
        .await
        .expect_err("lock held");

    assert!(err.to_string().contains("modeler-db-changelog"));
    let cause = err.source().expect("cause preserved");
    assert!(cause.to_string().contains("ACT_DE_seaql_migrations_lock"));
    assert!(matches!(
        err,
        DbInfraError::Migration {
            source: MigrationError::LockTimeout { .. },
            ..
        }
    ));
    Ok(())
}
