use db_infra::{
    keys, DbInfraError, PersistenceContext, PersistenceSettings, Properties, ResourceRegistry,
};

use crate::support::{external_db, table_exists};

#[tokio::test]
async fn resource_ref_name_resolves_under_comp_env() -> Result<(), DbInfraError> {
    let registry = ResourceRegistry::new();
    let conn = external_db().await;
    registry.bind("java:comp/env/jdbc/modelerDS", conn.clone());

    let props = Properties::new()
        .with(keys::JNDI_NAME, "jdbc/modelerDS")
        // ignored for an external source
        .with(keys::MIN_POOL_SIZE, "50")
        .with(keys::MAX_POOL_SIZE, "5");
    let settings = PersistenceSettings::from_properties(&props)?;
    let ctx = PersistenceContext::bootstrap(settings, &registry).await?;

    assert_eq!(ctx.source().kind(), "external");
    assert!(table_exists(&conn, "ACT_DE_MODEL").await);

    ctx.shutdown().await?;
    // still owned by the registry
    assert!(table_exists(&conn, "ACT_DE_seaql_migrations").await);
    Ok(())
}

#[tokio::test]
async fn second_bootstrap_takes_the_fast_path() -> Result<(), DbInfraError> {
    let registry = ResourceRegistry::new();
    registry.bind("jdbc/modelerDS", external_db().await);
    let props = Properties::new()
        .with(keys::JNDI_NAME, "jdbc/modelerDS")
        .with(keys::JNDI_RESOURCE_REF, "false");

    let first = PersistenceContext::bootstrap(
        PersistenceSettings::from_properties(&props)?,
        &registry,
    )
    .await?;
    assert!(!first.migration_report().skipped);
    first.shutdown().await?;

    let second = PersistenceContext::bootstrap(
        PersistenceSettings::from_properties(&props)?,
        &registry,
    )
    .await?;
    assert!(second.migration_report().skipped);
    assert_eq!(second.migration_report().applied_after, 1);
    second.shutdown().await
}

#[tokio::test]
async fn missing_resource_fails_startup() {
    let props = Properties::new().with(keys::JNDI_NAME, "jdbc/nowhere");
    let settings = PersistenceSettings::from_properties(&props).expect("settings");

    let err = PersistenceContext::bootstrap(settings, &ResourceRegistry::new())
        .await
        .expect_err("nothing bound");
    match err {
        DbInfraError::ResourceLookup { name, tried } => {
            assert_eq!(name, "jdbc/nowhere");
            assert_eq!(
                tried,
                vec![
                    "java:comp/env/jdbc/nowhere".to_string(),
                    "jdbc/nowhere".to_string()
                ]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
