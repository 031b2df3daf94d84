//! Persistence bootstrap for the modeler: connection source, changelog
//! runner, session factory and transaction manager.

pub mod config;
pub mod entities;
pub mod error;
pub mod infra;

pub use config::db::{
    DataSourceSettings, DriverKind, ExternalSource, MigrationPlan, PersistenceSettings,
    PoolConfig, SessionSettings,
};
pub use config::{keys, Properties};
pub use error::{DbInfraError, MigrationError};
pub use infra::db::{
    build_connection_source, build_session_factory, force_release_lock, run_migrations,
    ConnectionSource, MigrationReport, PersistenceContext, ResourceDirectory, ResourceRegistry,
    RunOutcome, RunStats, SessionFactory, TransactionManager, TxnPolicy,
};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    db_test_support::logging::init();
}
