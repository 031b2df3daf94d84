use db_infra::entities::model::{self, model_type};
use db_infra::infra::db::ChangelogLockTable;
use db_infra::{
    DbInfraError, PersistenceContext, PersistenceSettings, Properties, ResourceRegistry,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use time::OffsetDateTime;

use crate::support::{small_pool_props, table_exists};

#[tokio::test]
async fn defaults_bootstrap_an_in_memory_store() -> Result<(), DbInfraError> {
    let settings = PersistenceSettings::from_properties(&Properties::new())?;
    let ctx = PersistenceContext::bootstrap(settings, &ResourceRegistry::new()).await?;

    assert_eq!(ctx.source().kind(), "pooled");
    let report = ctx.migration_report();
    assert!(!report.skipped);
    assert_eq!(report.applied_before, 0);
    assert_eq!(report.applied_after, 1);
    assert_eq!(report.tables.changelog, "ACT_DE_seaql_migrations");
    assert_eq!(report.tables.changelog_lock, "ACT_DE_seaql_migrations_lock");

    ctx.shutdown().await
}

#[tokio::test]
async fn bookkeeping_and_domain_tables_are_created() -> Result<(), DbInfraError> {
    let settings = PersistenceSettings::from_properties(&small_pool_props())?;
    let ctx = PersistenceContext::bootstrap(settings, &ResourceRegistry::new()).await?;
    let conn = ctx.session_factory().open_session();

    for table in [
        "ACT_DE_seaql_migrations",
        "ACT_DE_seaql_migrations_lock",
        "ACT_DE_MODEL",
        "ACT_DE_MODEL_HISTORY",
        "ACT_DE_MODEL_RELATION",
    ] {
        assert!(table_exists(&conn, table).await, "missing table {table}");
    }
    assert!(!table_exists(&conn, "seaql_migrations").await);

    ctx.shutdown().await
}

#[tokio::test]
async fn changelog_lock_is_free_after_bootstrap() -> Result<(), DbInfraError> {
    let settings = PersistenceSettings::from_properties(&small_pool_props())?;
    let ctx = PersistenceContext::bootstrap(settings, &ResourceRegistry::new()).await?;

    let lock = ChangelogLockTable::new(
        ctx.source().connection()?,
        "ACT_DE_seaql_migrations_lock",
        "checker",
    );
    assert_eq!(lock.holder().await.expect("holder"), None);

    ctx.shutdown().await
}

#[tokio::test]
async fn models_round_trip_through_the_transaction_manager() -> Result<(), DbInfraError> {
    let props = small_pool_props().with(db_infra::keys::GENERATE_STATISTICS, "true");
    let settings = PersistenceSettings::from_properties(&props)?;
    let ctx = PersistenceContext::bootstrap(settings, &ResourceRegistry::new()).await?;

    let saved = ctx
        .transaction_manager()
        .with_txn(|txn| {
            Box::pin(async move {
                let now = OffsetDateTime::now_utc();
                model::ActiveModel {
                    name: Set("Expense approval".to_string()),
                    model_key: Set("expense-approval".to_string()),
                    created: Set(now),
                    created_by: Set(Some("admin".to_string())),
                    last_updated: Set(now),
                    version: Set(1),
                    model_type: Set(model_type::BPMN),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(DbInfraError::from)
            })
        })
        .await?;

    let found = model::Entity::find_by_id(saved.id)
        .one(&ctx.session_factory().open_session())
        .await?
        .expect("committed row");
    assert_eq!(found.model_key, "expense-approval");
    assert_eq!(found.created_by.as_deref(), Some("admin"));

    let stats = ctx.session_factory().statistics().expect("statistics enabled");
    assert_eq!(stats.transactions_committed, 1);
    assert!(stats.statements > 0);

    ctx.shutdown().await
}
